//! Row ↔ resource conversion.
//!
//! Hydration walks the materialized row and sets every column the resource
//! declares, cast to the declared in-memory type. Row keys with no
//! declared counterpart are ignored; a projection can always be narrower
//! or wider than the resource. Dehydration is the inverse, restricted to
//! declared columns.

use indexmap::IndexMap;

use crate::error::Result;
use crate::resource::Resource;
use crate::value::{QueryResult, Row, SqlValue};

/// Build one resource from one row.
pub fn hydrate<T: Resource + Default>(row: &Row) -> Result<T> {
    let mut item = T::default();
    for (column, value) in row.iter() {
        item.apply_column(column, value.clone())?;
    }
    Ok(item)
}

/// Build a resource per row of a materialized result.
pub fn hydrate_all<T: Resource + Default>(result: &QueryResult) -> Result<Vec<T>> {
    result.rows.iter().map(hydrate).collect()
}

/// Declared columns of a resource as database values, in declared order.
pub fn dehydrate<T: Resource>(item: &T) -> IndexMap<String, SqlValue> {
    item.collect_columns()
        .into_iter()
        .map(|(column, value)| (column.to_string(), value))
        .collect()
}

/// Map a hydrated batch into its declared domain representation.
pub fn to_domain_all<T: crate::resource::IntoDomain>(items: &[T]) -> Vec<T::Domain> {
    items.iter().map(T::to_domain).collect()
}
