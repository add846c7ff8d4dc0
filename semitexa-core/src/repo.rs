//! Primary-key write path.
//!
//! Plain INSERT/UPDATE/DELETE over dehydrated rows. The uuid strategy
//! fills an absent key before insert; the auto strategy reads the
//! generated id back into the resource.

use crate::db::{DatabaseAdapter, TransactionManager};
use crate::error::{Error, Result};
use crate::hydrate::{dehydrate, hydrate};
use crate::resource::Resource;
use crate::schema::{PkStrategy, RelationKind};
use crate::value::{ColumnValue, SqlValue};

/// Insert one resource. Returns the primary key value in effect after the
/// write.
pub async fn insert<T: Resource>(db: &dyn DatabaseAdapter, item: &mut T) -> Result<SqlValue> {
    let meta = T::metadata();
    let mut values = dehydrate(item);

    match meta.pk_strategy {
        PkStrategy::Uuid => {
            if values.get(&meta.pk_column).map_or(true, SqlValue::is_null) {
                let fresh = uuid::Uuid::new_v4().into_value();
                item.apply_column(&meta.pk_column, fresh.clone())?;
                values.insert(meta.pk_column.clone(), fresh);
            }
        }
        PkStrategy::Auto => {
            // The server generates the key; never send an explicit NULL id.
            if values.get(&meta.pk_column).map_or(false, SqlValue::is_null) {
                values.swap_remove(&meta.pk_column);
            }
        }
        PkStrategy::Manual => {
            if values.get(&meta.pk_column).map_or(true, SqlValue::is_null) {
                return Err(Error::BadQuery(format!(
                    "insert into {} requires a manual primary key value",
                    meta.table
                )));
            }
        }
    }

    let columns: Vec<&String> = values.keys().collect();
    let column_list = columns
        .iter()
        .map(|c| format!("`{c}`"))
        .collect::<Vec<_>>()
        .join(", ");
    let marks = vec!["?"; columns.len()].join(", ");
    let sql = format!("INSERT INTO `{}` ({column_list}) VALUES ({marks})", meta.table);
    let params: Vec<SqlValue> = values.values().cloned().collect();

    let result = db.execute(&sql, &params).await?;

    if meta.pk_strategy == PkStrategy::Auto && result.last_insert_id > 0 {
        item.apply_column(&meta.pk_column, SqlValue::UInt(result.last_insert_id))?;
    }
    Ok(item.pk_value())
}

/// Update one resource by primary key. Returns the affected-row count.
pub async fn update<T: Resource>(db: &dyn DatabaseAdapter, item: &T) -> Result<u64> {
    let meta = T::metadata();
    let mut values = dehydrate(item);
    let pk = values
        .swap_remove(&meta.pk_column)
        .filter(|v| !v.is_null())
        .ok_or_else(|| {
            Error::BadQuery(format!("update on {} requires a primary key value", meta.table))
        })?;

    if values.is_empty() {
        return Ok(0);
    }

    let assignments = values
        .keys()
        .map(|c| format!("`{c}` = ?"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE `{}` SET {assignments} WHERE `{}` = ?",
        meta.table, meta.pk_column
    );
    let mut params: Vec<SqlValue> = values.values().cloned().collect();
    params.push(pk);

    Ok(db.execute(&sql, &params).await?.affected_rows)
}

/// Delete one row by primary key.
pub async fn delete_by_pk<T: Resource>(db: &dyn DatabaseAdapter, pk: SqlValue) -> Result<u64> {
    if pk.is_null() {
        return Err(Error::BadQuery("cannot delete by a NULL primary key".into()));
    }
    let meta = T::metadata();
    let sql = format!("DELETE FROM `{}` WHERE `{}` = ?", meta.table, meta.pk_column);
    Ok(db.execute(&sql, &[pk]).await?.affected_rows)
}

/// Fetch one row by primary key.
pub async fn find_by_pk<T: Resource + Default>(
    db: &dyn DatabaseAdapter,
    pk: SqlValue,
) -> Result<Option<T>> {
    let meta = T::metadata();
    let sql = format!(
        "SELECT * FROM `{}` WHERE `{}` = ? LIMIT 1",
        meta.table, meta.pk_column
    );
    let result = db.execute(&sql, &[pk]).await?;
    match result.rows.first() {
        Some(row) => hydrate(row).map(Some),
        None => Ok(None),
    }
}

/// Replace a ManyToMany edge set: delete the parent's pivot rows, then
/// insert the new set, both inside one transaction so a failure between
/// the two statements cannot leave the pivot empty.
pub async fn sync_pivot<T: Resource>(
    tm: &TransactionManager,
    relation: &str,
    parent_pk: SqlValue,
    related_ids: &[SqlValue],
) -> Result<()> {
    let meta = T::metadata();
    let rel = meta.relation(relation)?;
    if rel.kind != RelationKind::ManyToMany {
        return Err(Error::UnknownRelation(format!(
            "{relation} is not a many-to-many relation"
        )));
    }
    let pivot = rel.pivot_table.clone().ok_or_else(|| {
        Error::UnknownRelation(format!("{relation} has no pivot metadata"))
    })?;
    let fk = rel.foreign_key.clone();
    let related_key = rel.related_key.clone().ok_or_else(|| {
        Error::UnknownRelation(format!("{relation} has no related key"))
    })?;
    if parent_pk.is_null() {
        return Err(Error::BadQuery("pivot sync requires a parent primary key".into()));
    }

    let tx = tm.begin().await?;

    let delete_sql = format!("DELETE FROM `{pivot}` WHERE `{fk}` = ?");
    if let Err(err) = tx.execute(&delete_sql, &[parent_pk.clone()]).await {
        let _ = tx.rollback().await;
        return Err(err);
    }

    if !related_ids.is_empty() {
        let marks = vec!["(?, ?)"; related_ids.len()].join(", ");
        let insert_sql =
            format!("INSERT INTO `{pivot}` (`{fk}`, `{related_key}`) VALUES {marks}");
        let mut params = Vec::with_capacity(related_ids.len() * 2);
        for related in related_ids {
            params.push(parent_pk.clone());
            params.push(related.clone());
        }
        if let Err(err) = tx.execute(&insert_sql, &params).await {
            let _ = tx.rollback().await;
            return Err(err);
        }
    }

    tx.commit().await
}

/// Per-type facade bundling the read and write paths on one adapter.
///
/// ```ignore
/// let users = Repository::<User>::new(&db);
/// let mut user = users.find(SqlValue::Int(1)).await?.unwrap();
/// user.email = "new@example.com".into();
/// users.save(&mut user).await?;
/// ```
pub struct Repository<'a, T: Resource> {
    db: &'a dyn DatabaseAdapter,
    _resource: std::marker::PhantomData<fn() -> T>,
}

impl<'a, T> Repository<'a, T>
where
    T: crate::relations::RelationLoad,
{
    pub fn new(db: &'a dyn DatabaseAdapter) -> Self {
        Self { db, _resource: std::marker::PhantomData }
    }

    /// Start a validated query over this resource.
    pub fn query(&self) -> crate::query::Query<'a, T> {
        crate::query::Query::new(self.db)
    }

    pub async fn find(&self, pk: impl Into<SqlValue>) -> Result<Option<T>> {
        find_by_pk(self.db, pk.into()).await
    }

    /// Fetch one row and load all (or selected) relations onto it.
    pub async fn find_with_relations(
        &self,
        pk: impl Into<SqlValue>,
        only: Option<&[&str]>,
    ) -> Result<Option<T>> {
        match find_by_pk::<T>(self.db, pk.into()).await? {
            Some(mut item) => {
                crate::relations::load_relations_one(self.db, &mut item, only).await?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    /// Insert when the primary key is unset, update otherwise.
    pub async fn save(&self, item: &mut T) -> Result<SqlValue> {
        if item.pk_value().is_null() {
            insert(self.db, item).await
        } else {
            update(self.db, item).await?;
            Ok(item.pk_value())
        }
    }

    pub async fn insert(&self, item: &mut T) -> Result<SqlValue> {
        insert(self.db, item).await
    }

    pub async fn update(&self, item: &T) -> Result<u64> {
        update(self.db, item).await
    }

    pub async fn delete(&self, pk: impl Into<SqlValue>) -> Result<u64> {
        delete_by_pk::<T>(self.db, pk.into()).await
    }

    /// Batch-load relations onto already-fetched resources.
    pub async fn load_relations(&self, items: &mut [T], only: Option<&[&str]>) -> Result<()> {
        crate::relations::load_relations(self.db, items, only).await
    }
}
