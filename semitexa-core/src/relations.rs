//! Batched relation loading.
//!
//! For a homogeneous batch of parents, each relation loads with a fixed
//! number of statements: one `SELECT ... WHERE key IN (...)` for
//! BelongsTo/HasMany/OneToOne, two for ManyToMany (pivot, then targets).
//! Per-row fetching does not exist here; N+1 fan-out is structurally
//! impossible.

use std::collections::HashMap;

use futures::future::BoxFuture;

use crate::db::DatabaseAdapter;
use crate::error::Result;
use crate::hydrate::hydrate_all;
use crate::resource::{RelationDescriptor, Resource};
use crate::value::{SqlValue, ValueKey};

/// Implemented by the derive: dispatches one relation property to the
/// batch loader with the right field accessors.
pub trait RelationLoad: Resource + Clone + Default {
    fn load_relation<'a>(
        db: &'a dyn DatabaseAdapter,
        items: &'a mut [Self],
        property: &'a str,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Load relations for a batch of resources.
///
/// `only` filters by property name; `Some(&[])` skips everything. An empty
/// batch issues no statement at all.
pub async fn load_relations<T: RelationLoad>(
    db: &dyn DatabaseAdapter,
    items: &mut [T],
    only: Option<&[&str]>,
) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    let properties: Vec<String> = T::metadata()
        .relations
        .iter()
        .map(|r| r.property.clone())
        .filter(|p| only.map_or(true, |names| names.contains(&p.as_str())))
        .collect();
    for property in properties {
        T::load_relation(db, items, &property).await?;
    }
    Ok(())
}

/// Single-resource form of [`load_relations`].
pub async fn load_relations_one<T: RelationLoad>(
    db: &dyn DatabaseAdapter,
    item: &mut T,
    only: Option<&[&str]>,
) -> Result<()> {
    load_relations(db, std::slice::from_mut(item), only).await
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Distinct non-null keys of a batch, preserving first-seen order.
fn distinct_keys<P>(parents: &[P], key_of: &impl Fn(&P) -> SqlValue) -> Vec<SqlValue> {
    let mut seen: HashMap<ValueKey, ()> = HashMap::new();
    let mut out = Vec::new();
    for parent in parents {
        let value = key_of(parent);
        if let Some(key) = value.as_key() {
            if seen.insert(key, ()).is_none() {
                out.push(value);
            }
        }
    }
    out
}

/// Value of one column of a resource, through its dehydrated form.
fn column_value<T: Resource>(item: &T, column: &str) -> SqlValue {
    item.collect_columns()
        .into_iter()
        .find(|(name, _)| *name == column)
        .map(|(_, value)| value)
        .unwrap_or(SqlValue::Null)
}

/// BelongsTo: one `SELECT` over the distinct owning-side foreign keys,
/// indexed by target primary key.
pub async fn load_belongs_to<P, T>(
    db: &dyn DatabaseAdapter,
    parents: &mut [P],
    rel: &RelationDescriptor,
    fk_of: impl Fn(&P) -> SqlValue,
    mut assign: impl FnMut(&mut P, T),
) -> Result<()>
where
    P: Resource,
    T: Resource + Default + Clone,
{
    let keys = distinct_keys(parents, &fk_of);
    if keys.is_empty() {
        return Ok(());
    }

    let sql = format!(
        "SELECT * FROM `{}` WHERE `{}` IN ({})",
        rel.target_table,
        rel.target_pk,
        placeholders(keys.len())
    );
    let result = db.execute(&sql, &keys).await?;
    let targets: Vec<T> = hydrate_all(&result)?;

    let mut index: HashMap<ValueKey, T> = HashMap::with_capacity(targets.len());
    for target in targets {
        if let Some(key) = target.pk_value().as_key() {
            index.insert(key, target);
        }
    }

    for parent in parents.iter_mut() {
        let Some(key) = fk_of(parent).as_key() else { continue };
        if let Some(target) = index.get(&key) {
            assign(parent, target.clone());
        }
    }
    Ok(())
}

/// HasMany: one `SELECT` over the distinct parent primary keys, grouped by
/// the child's foreign key. Every parent gets a group, possibly empty;
/// group order follows the query's row order.
pub async fn load_has_many<P, T>(
    db: &dyn DatabaseAdapter,
    parents: &mut [P],
    rel: &RelationDescriptor,
    pk_of: impl Fn(&P) -> SqlValue,
    mut assign: impl FnMut(&mut P, Vec<T>),
) -> Result<()>
where
    P: Resource,
    T: Resource + Default + Clone,
{
    let keys = distinct_keys(parents, &pk_of);
    if keys.is_empty() {
        return Ok(());
    }

    let sql = format!(
        "SELECT * FROM `{}` WHERE `{}` IN ({})",
        rel.target_table,
        rel.foreign_key,
        placeholders(keys.len())
    );
    let result = db.execute(&sql, &keys).await?;
    let children: Vec<T> = hydrate_all(&result)?;

    let mut groups: HashMap<ValueKey, Vec<T>> = HashMap::new();
    for child in children {
        if let Some(key) = column_value(&child, &rel.foreign_key).as_key() {
            groups.entry(key).or_default().push(child);
        }
    }

    for parent in parents.iter_mut() {
        let group = pk_of(parent)
            .as_key()
            .and_then(|key| groups.get(&key).cloned())
            .unwrap_or_default();
        assign(parent, group);
    }
    Ok(())
}

/// OneToOne: the HasMany shape, indexed instead of grouped; at most one
/// child per parent is assigned.
pub async fn load_one_to_one<P, T>(
    db: &dyn DatabaseAdapter,
    parents: &mut [P],
    rel: &RelationDescriptor,
    pk_of: impl Fn(&P) -> SqlValue,
    mut assign: impl FnMut(&mut P, T),
) -> Result<()>
where
    P: Resource,
    T: Resource + Default + Clone,
{
    let keys = distinct_keys(parents, &pk_of);
    if keys.is_empty() {
        return Ok(());
    }

    let sql = format!(
        "SELECT * FROM `{}` WHERE `{}` IN ({})",
        rel.target_table,
        rel.foreign_key,
        placeholders(keys.len())
    );
    let result = db.execute(&sql, &keys).await?;
    let children: Vec<T> = hydrate_all(&result)?;

    let mut index: HashMap<ValueKey, T> = HashMap::with_capacity(children.len());
    for child in children {
        if let Some(key) = column_value(&child, &rel.foreign_key).as_key() {
            index.entry(key).or_insert(child);
        }
    }

    for parent in parents.iter_mut() {
        let Some(key) = pk_of(parent).as_key() else { continue };
        if let Some(child) = index.get(&key) {
            assign(parent, child.clone());
        }
    }
    Ok(())
}

/// ManyToMany: the pivot query first, then one `SELECT` over the distinct
/// related keys. An empty pivot result assigns every parent an empty list
/// without a second statement.
pub async fn load_many_to_many<P, T>(
    db: &dyn DatabaseAdapter,
    parents: &mut [P],
    rel: &RelationDescriptor,
    pk_of: impl Fn(&P) -> SqlValue,
    mut assign: impl FnMut(&mut P, Vec<T>),
) -> Result<()>
where
    P: Resource,
    T: Resource + Default + Clone,
{
    let (Some(pivot), Some(related_key)) = (&rel.pivot_table, &rel.related_key) else {
        return Err(crate::error::Error::UnknownRelation(format!(
            "{} has no pivot metadata",
            rel.property
        )));
    };

    let keys = distinct_keys(parents, &pk_of);
    if keys.is_empty() {
        return Ok(());
    }

    let pivot_sql = format!(
        "SELECT `{}`, `{}` FROM `{}` WHERE `{}` IN ({})",
        rel.foreign_key,
        related_key,
        pivot,
        rel.foreign_key,
        placeholders(keys.len())
    );
    let pivot_rows = db.execute(&pivot_sql, &keys).await?;

    if pivot_rows.rows.is_empty() {
        for parent in parents.iter_mut() {
            assign(parent, Vec::new());
        }
        return Ok(());
    }

    // Pivot pairs in row order, plus the distinct related-key list.
    let mut pairs: Vec<(ValueKey, SqlValue)> = Vec::with_capacity(pivot_rows.rows.len());
    let mut related_values: Vec<SqlValue> = Vec::new();
    let mut seen_related: HashMap<ValueKey, ()> = HashMap::new();
    for row in &pivot_rows.rows {
        let fk = row.get(&rel.foreign_key).cloned().unwrap_or(SqlValue::Null);
        let related = row.get(related_key.as_str()).cloned().unwrap_or(SqlValue::Null);
        let (Some(fk_key), Some(related_key_value)) = (fk.as_key(), related.as_key()) else {
            continue;
        };
        pairs.push((fk_key, related.clone()));
        if seen_related.insert(related_key_value, ()).is_none() {
            related_values.push(related);
        }
    }

    let target_sql = format!(
        "SELECT * FROM `{}` WHERE `{}` IN ({})",
        rel.target_table,
        rel.target_pk,
        placeholders(related_values.len())
    );
    let result = db.execute(&target_sql, &related_values).await?;
    let targets: Vec<T> = hydrate_all(&result)?;

    let mut index: HashMap<ValueKey, T> = HashMap::with_capacity(targets.len());
    for target in targets {
        if let Some(key) = target.pk_value().as_key() {
            index.insert(key, target);
        }
    }

    for parent in parents.iter_mut() {
        let Some(parent_key) = pk_of(parent).as_key() else {
            assign(parent, Vec::new());
            continue;
        };
        let mut group = Vec::new();
        for (fk_key, related) in &pairs {
            if *fk_key == parent_key {
                if let Some(target) = related.as_key().and_then(|k| index.get(&k)) {
                    group.push(target.clone());
                }
            }
        }
        assign(parent, group);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{row, Order, StubDb, User};
    use crate::value::QueryResult;

    fn users(n: i64) -> Vec<User> {
        (1..=n)
            .map(|i| User { id: Some(i), email: format!("u{i}@x"), ..Default::default() })
            .collect()
    }

    fn order_row(id: i64, user_id: i64) -> crate::value::Row {
        row(vec![
            ("id", SqlValue::Int(id)),
            ("user_id", SqlValue::Int(user_id)),
            ("total", SqlValue::Float(10.0)),
        ])
    }

    #[tokio::test]
    async fn empty_batch_issues_no_queries() {
        let db = StubDb::new();
        let mut none: Vec<User> = Vec::new();
        load_relations(&db, &mut none, None).await.unwrap();
        assert_eq!(db.statement_count(), 0);
    }

    #[tokio::test]
    async fn only_empty_skips_all_relations() {
        let db = StubDb::new();
        let mut batch = users(3);
        load_relations(&db, &mut batch, Some(&[])).await.unwrap();
        assert_eq!(db.statement_count(), 0);
    }

    #[tokio::test]
    async fn has_many_is_one_query_with_grouping() {
        let db = StubDb::new();
        // 100 users with 3 orders each.
        let mut rows = Vec::new();
        let mut id = 0;
        for user_id in 1..=100 {
            for _ in 0..3 {
                id += 1;
                rows.push(order_row(id, user_id));
            }
        }
        db.push_rows(rows);

        let mut batch = users(100);
        load_relations(&db, &mut batch, Some(&["orders"])).await.unwrap();

        assert_eq!(db.statement_count(), 1, "exactly one SELECT per relation");
        let (sql, params) = db.statement(0);
        assert!(sql.starts_with("SELECT * FROM `orders` WHERE `user_id` IN ("));
        assert_eq!(sql.matches('?').count(), 100, "100 placeholders");
        assert_eq!(params.len(), 100);

        let loaded: usize = batch.iter().map(|u| u.orders.len()).sum();
        assert_eq!(loaded, 300);
        assert!(batch.iter().all(|u| u.orders.len() == 3));
        // Group order follows row order.
        assert_eq!(batch[0].orders[0].id, Some(1));
        assert_eq!(batch[0].orders[2].id, Some(3));
    }

    #[tokio::test]
    async fn has_many_assigns_empty_groups() {
        let db = StubDb::new();
        db.push_rows(vec![order_row(1, 1)]);
        let mut batch = users(2);
        batch[0].orders.push(Order::default()); // stale data must be replaced
        batch[1].orders.push(Order::default());

        load_relations(&db, &mut batch, Some(&["orders"])).await.unwrap();
        assert_eq!(batch[0].orders.len(), 1);
        assert!(batch[1].orders.is_empty(), "parents without children get an empty list");
    }

    #[tokio::test]
    async fn duplicate_parents_each_get_their_group() {
        let db = StubDb::new();
        db.push_rows(vec![order_row(1, 7), order_row(2, 7)]);

        // The same logical parent appears twice in the batch; the single
        // SELECT still carries one placeholder and both copies are filled.
        let mut batch = vec![
            User { id: Some(7), ..Default::default() },
            User { id: Some(7), ..Default::default() },
        ];
        load_relations(&db, &mut batch, Some(&["orders"])).await.unwrap();

        let (sql, params) = db.statement(0);
        assert_eq!(sql.matches('?').count(), 1, "duplicate keys collapse: {sql}");
        assert_eq!(params, vec![SqlValue::Int(7)]);
        assert_eq!(batch[0].orders.len(), 2);
        assert_eq!(batch[1].orders.len(), 2);
    }

    #[tokio::test]
    async fn belongs_to_batches_distinct_fks() {
        let db = StubDb::new();
        db.push_rows(vec![
            row(vec![
                ("id", SqlValue::Int(1)),
                ("email", SqlValue::Text("a@x".into())),
                ("active", SqlValue::Bool(true)),
            ]),
            row(vec![
                ("id", SqlValue::Int(2)),
                ("email", SqlValue::Text("b@x".into())),
                ("active", SqlValue::Bool(false)),
            ]),
        ]);

        let mut orders = vec![
            Order { id: Some(10), user_id: Some(1), ..Default::default() },
            Order { id: Some(11), user_id: Some(1), ..Default::default() },
            Order { id: Some(12), user_id: Some(2), ..Default::default() },
            Order { id: Some(13), user_id: None, ..Default::default() },
        ];
        load_relations(&db, &mut orders, None).await.unwrap();

        assert_eq!(db.statement_count(), 1);
        let (sql, params) = db.statement(0);
        assert!(sql.starts_with("SELECT * FROM `users` WHERE `id` IN ("));
        // Distinct non-null keys only: 1 and 2.
        assert_eq!(params, vec![SqlValue::Int(1), SqlValue::Int(2)]);

        assert_eq!(orders[0].user.as_ref().unwrap().email, "a@x");
        assert_eq!(orders[1].user.as_ref().unwrap().email, "a@x");
        assert_eq!(orders[2].user.as_ref().unwrap().email, "b@x");
        assert!(orders[3].user.is_none(), "null FK loads nothing");
    }

    #[tokio::test]
    async fn belongs_to_with_all_null_fks_issues_nothing() {
        let db = StubDb::new();
        let mut orders = vec![Order::default(), Order::default()];
        load_relations(&db, &mut orders, None).await.unwrap();
        assert_eq!(db.statement_count(), 0);
    }

    #[tokio::test]
    async fn one_to_one_assigns_single_child() {
        let db = StubDb::new();
        db.push_rows(vec![row(vec![
            ("id", SqlValue::Int(5)),
            ("user_id", SqlValue::Int(2)),
            ("bio", SqlValue::Text("hi".into())),
        ])]);

        let mut batch = users(2);
        load_relations(&db, &mut batch, Some(&["profile"])).await.unwrap();
        assert_eq!(db.statement_count(), 1);
        assert!(batch[0].profile.is_none());
        assert_eq!(batch[1].profile.as_ref().unwrap().bio.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn many_to_many_uses_two_queries_and_joins_through_pivot() {
        let db = StubDb::new();
        // Pivot rows: user 1 -> tags 7, 8; user 2 -> tag 7.
        db.push_rows(vec![
            row(vec![("user_id", SqlValue::Int(1)), ("tag_id", SqlValue::Int(7))]),
            row(vec![("user_id", SqlValue::Int(1)), ("tag_id", SqlValue::Int(8))]),
            row(vec![("user_id", SqlValue::Int(2)), ("tag_id", SqlValue::Int(7))]),
        ]);
        db.push_rows(vec![
            row(vec![("id", SqlValue::Int(7)), ("label", SqlValue::Text("red".into()))]),
            row(vec![("id", SqlValue::Int(8)), ("label", SqlValue::Text("blue".into()))]),
        ]);

        let mut batch = users(2);
        load_relations(&db, &mut batch, Some(&["tags"])).await.unwrap();

        assert_eq!(db.statement_count(), 2, "pivot query plus target query");
        let (pivot_sql, _) = db.statement(0);
        assert!(pivot_sql.starts_with("SELECT `user_id`, `tag_id` FROM `user_tags` WHERE `user_id` IN ("));
        let (target_sql, target_params) = db.statement(1);
        assert!(target_sql.starts_with("SELECT * FROM `tags` WHERE `id` IN ("));
        // Distinct related keys: 7, 8.
        assert_eq!(target_params, vec![SqlValue::Int(7), SqlValue::Int(8)]);

        let labels: Vec<&str> = batch[0].tags.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["red", "blue"]);
        assert_eq!(batch[1].tags.len(), 1);
    }

    #[tokio::test]
    async fn many_to_many_empty_pivot_short_circuits() {
        let db = StubDb::new();
        db.push_response(QueryResult::empty());

        let mut batch = users(3);
        batch[0].tags.push(crate::testing::Tag::default());
        load_relations(&db, &mut batch, Some(&["tags"])).await.unwrap();

        assert_eq!(db.statement_count(), 1, "no target query for an empty pivot");
        assert!(batch.iter().all(|u| u.tags.is_empty()));
    }

    #[tokio::test]
    async fn full_relation_pass_is_bounded_per_relation() {
        let db = StubDb::new();
        db.push_rows(vec![order_row(1, 1)]); // orders
        db.push_response(QueryResult::empty()); // profiles
        db.push_response(QueryResult::empty()); // pivot
        let mut batch = users(4);
        load_relations(&db, &mut batch, None).await.unwrap();
        // has_many: 1, one_to_one: 1, many_to_many empty pivot: 1.
        assert_eq!(db.statement_count(), 3);
    }
}
