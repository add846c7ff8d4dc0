//! Query builder.
//!
//! Explicit `filter`/`filter_relation` calls validated against the
//! resource's filterable map and relation map. There is no name-pattern
//! dispatch. Value semantics: `Null` compares with `IS NULL`, a list with
//! `IN (...)`, a scalar with `=`.

use std::marker::PhantomData;

use crate::db::DatabaseAdapter;
use crate::error::{Error, Result};
use crate::hydrate::hydrate_all;
use crate::resource::Resource;
use crate::schema::{valid_identifier, RelationKind};
use crate::value::SqlValue;

/// Right-hand side of one criterion.
#[derive(Debug, Clone)]
pub enum FilterValue {
    Null,
    Scalar(SqlValue),
    List(Vec<SqlValue>),
}

impl From<SqlValue> for FilterValue {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => FilterValue::Null,
            other => FilterValue::Scalar(other),
        }
    }
}

impl From<Vec<SqlValue>> for FilterValue {
    fn from(values: Vec<SqlValue>) -> Self {
        FilterValue::List(values)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Scalar(SqlValue::Int(value))
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Scalar(SqlValue::Text(value.to_string()))
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Scalar(SqlValue::Bool(value))
    }
}

/// Comparison operator for scalar criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl Operator {
    /// Parse the textual form; anything else is a [`Error::BadQuery`].
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "=" | "eq" => Self::Eq,
            "!=" | "<>" | "ne" => Self::Ne,
            "<" | "lt" => Self::Lt,
            "<=" | "le" => Self::Le,
            ">" | "gt" => Self::Gt,
            ">=" | "ge" => Self::Ge,
            "like" | "LIKE" => Self::Like,
            other => return Err(Error::BadQuery(format!("invalid operator {other:?}"))),
        })
    }

    fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
        }
    }
}

/// One page of results plus the unpaged total.
#[derive(Debug, Clone)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}

impl<T> PageResult<T> {
    pub fn page_count(&self) -> u64 {
        self.total.div_ceil(self.per_page.max(1))
    }
}

#[derive(Debug, Clone)]
struct Criterion {
    /// Fully qualified, quoted column expression.
    column: String,
    operator: Operator,
    value: FilterValue,
}

/// Fluent, validated SELECT/DELETE builder over one resource type.
pub struct Query<'a, T: Resource> {
    db: &'a dyn DatabaseAdapter,
    criteria: Vec<Criterion>,
    joins: Vec<String>,
    order: Option<(String, bool)>,
    page: Option<(u64, u64)>,
    join_count: usize,
    _resource: PhantomData<T>,
}

impl<'a, T: Resource> std::fmt::Debug for Query<'a, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("criteria", &self.criteria)
            .field("joins", &self.joins)
            .field("order", &self.order)
            .field("page", &self.page)
            .field("join_count", &self.join_count)
            .finish()
    }
}

impl<'a, T: Resource + Default + Clone> Query<'a, T> {
    pub fn new(db: &'a dyn DatabaseAdapter) -> Self {
        Self {
            db,
            criteria: Vec::new(),
            joins: Vec::new(),
            order: None,
            page: None,
            join_count: 0,
            _resource: PhantomData,
        }
    }

    fn base_column(column: &str) -> String {
        format!("`{}`.`{}`", T::table_name(), column)
    }

    /// Equality criterion on a filterable property of the resource.
    pub fn filter(mut self, property: &str, value: impl Into<FilterValue>) -> Result<Self> {
        let column = T::metadata().filter_column(property)?.to_string();
        self.criteria.push(Criterion {
            column: Self::base_column(&column),
            operator: Operator::Eq,
            value: value.into(),
        });
        Ok(self)
    }

    /// Criterion with an explicit operator (`=`, `!=`, `<`, `<=`, `>`,
    /// `>=`, `like`). Lists only combine with equality; `Null` only with
    /// equality or inequality.
    pub fn filter_op(
        mut self,
        property: &str,
        operator: &str,
        value: impl Into<FilterValue>,
    ) -> Result<Self> {
        let operator = Operator::parse(operator)?;
        let value = value.into();
        match (&value, operator) {
            (FilterValue::List(_), op) if op != Operator::Eq => {
                return Err(Error::BadQuery(format!(
                    "operator {} cannot apply to a list",
                    op.as_sql()
                )));
            }
            (FilterValue::Null, op) if op != Operator::Eq && op != Operator::Ne => {
                return Err(Error::BadQuery(format!(
                    "operator {} cannot apply to NULL",
                    op.as_sql()
                )));
            }
            _ => {}
        }
        let column = T::metadata().filter_column(property)?.to_string();
        self.criteria.push(Criterion {
            column: Self::base_column(&column),
            operator,
            value,
        });
        Ok(self)
    }

    /// Pin every row to one tenant; ANDed into all other criteria.
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.criteria.push(Criterion {
            column: Self::base_column("tenant_id"),
            operator: Operator::Eq,
            value: FilterValue::Scalar(SqlValue::Text(tenant.into())),
        });
        self
    }

    /// Criterion on a column of a related resource; joins the relation's
    /// target (through the pivot for ManyToMany).
    pub fn filter_relation(
        mut self,
        relation: &str,
        column: &str,
        value: impl Into<FilterValue>,
    ) -> Result<Self> {
        if !valid_identifier(column) {
            return Err(Error::BadQuery(format!(
                "invalid related column name {column:?}"
            )));
        }
        let meta = T::metadata();
        let rel = meta.relation(relation)?;
        let base = T::table_name();
        self.join_count += 1;
        let alias = format!("r{}", self.join_count);

        match rel.kind {
            RelationKind::BelongsTo => {
                self.joins.push(format!(
                    "JOIN `{}` AS `{alias}` ON `{base}`.`{}` = `{alias}`.`{}`",
                    rel.target_table, rel.foreign_key, rel.target_pk
                ));
            }
            RelationKind::HasMany | RelationKind::OneToOne => {
                self.joins.push(format!(
                    "JOIN `{}` AS `{alias}` ON `{alias}`.`{}` = `{base}`.`{}`",
                    rel.target_table, rel.foreign_key, meta.pk_column
                ));
            }
            RelationKind::ManyToMany => {
                let pivot = rel.pivot_table.as_deref().ok_or_else(|| {
                    Error::UnknownRelation(format!("{relation} has no pivot metadata"))
                })?;
                let related_key = rel.related_key.as_deref().ok_or_else(|| {
                    Error::UnknownRelation(format!("{relation} has no related key"))
                })?;
                let pivot_alias = format!("p{}", self.join_count);
                self.joins.push(format!(
                    "JOIN `{pivot}` AS `{pivot_alias}` ON `{pivot_alias}`.`{}` = `{base}`.`{}`",
                    rel.foreign_key, meta.pk_column
                ));
                self.joins.push(format!(
                    "JOIN `{}` AS `{alias}` ON `{alias}`.`{}` = `{pivot_alias}`.`{}`",
                    rel.target_table, rel.target_pk, related_key
                ));
            }
        }

        self.criteria.push(Criterion {
            column: format!("`{alias}`.`{column}`"),
            operator: Operator::Eq,
            value: value.into(),
        });
        Ok(self)
    }

    /// Order by a filterable property.
    pub fn order_by(mut self, property: &str, descending: bool) -> Result<Self> {
        let column = T::metadata().filter_column(property)?.to_string();
        self.order = Some((Self::base_column(&column), descending));
        Ok(self)
    }

    /// 1-based pagination; both arguments must be at least 1.
    pub fn paginate(mut self, page: u64, per_page: u64) -> Result<Self> {
        if page < 1 || per_page < 1 {
            return Err(Error::BadQuery(format!(
                "page and per_page must be >= 1, got page={page} per_page={per_page}"
            )));
        }
        self.page = Some((page, per_page));
        Ok(self)
    }

    fn render_where(&self) -> (String, Vec<SqlValue>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        for criterion in &self.criteria {
            match &criterion.value {
                FilterValue::Null => {
                    let form = if criterion.operator == Operator::Ne {
                        "IS NOT NULL"
                    } else {
                        "IS NULL"
                    };
                    clauses.push(format!("{} {form}", criterion.column));
                }
                FilterValue::Scalar(value) => {
                    clauses.push(format!(
                        "{} {} ?",
                        criterion.column,
                        criterion.operator.as_sql()
                    ));
                    params.push(value.clone());
                }
                FilterValue::List(values) if values.is_empty() => {
                    // IN () is invalid SQL; an empty list matches nothing.
                    clauses.push("1 = 0".to_string());
                }
                FilterValue::List(values) => {
                    let marks = vec!["?"; values.len()].join(", ");
                    clauses.push(format!("{} IN ({marks})", criterion.column));
                    params.extend(values.iter().cloned());
                }
            }
        }
        if clauses.is_empty() {
            (String::new(), params)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), params)
        }
    }

    fn render_select(&self, projection: &str) -> (String, Vec<SqlValue>) {
        let base = T::table_name();
        let mut sql = format!("SELECT {projection} FROM `{base}`");
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        let (where_sql, params) = self.render_where();
        sql.push_str(&where_sql);
        if let Some((column, descending)) = &self.order {
            sql.push_str(&format!(
                " ORDER BY {column} {}",
                if *descending { "DESC" } else { "ASC" }
            ));
        }
        if let Some((page, per_page)) = self.page {
            let offset = (page - 1) * per_page;
            sql.push_str(&format!(" LIMIT {per_page} OFFSET {offset}"));
        }
        (sql, params)
    }

    /// Run the SELECT and hydrate every row.
    pub async fn fetch(self) -> Result<Vec<T>> {
        let projection = format!("`{}`.*", T::table_name());
        let (sql, params) = self.render_select(&projection);
        let result = self.db.execute(&sql, &params).await?;
        hydrate_all(&result)
    }

    /// First row, if any.
    pub async fn fetch_one(mut self) -> Result<Option<T>> {
        if self.page.is_none() {
            self.page = Some((1, 1));
        }
        Ok(self.fetch().await?.into_iter().next())
    }

    /// Fetch and map through the resource's declared domain type.
    pub async fn fetch_domain(self) -> Result<Vec<T::Domain>>
    where
        T: crate::resource::IntoDomain,
    {
        let items = self.fetch().await?;
        Ok(crate::hydrate::to_domain_all(&items))
    }

    /// COUNT over joins and criteria only, never LIMIT or ORDER BY.
    fn render_count(&self) -> (String, Vec<SqlValue>) {
        let base = T::table_name();
        let projection = if self.joins.is_empty() {
            "COUNT(*) AS cnt".to_string()
        } else {
            // Joins can fan rows out; count distinct base rows.
            format!("COUNT(DISTINCT `{base}`.`{}`) AS cnt", T::metadata().pk_column)
        };
        let mut sql = format!("SELECT {projection} FROM `{base}`");
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        let (where_sql, params) = self.render_where();
        sql.push_str(&where_sql);
        (sql, params)
    }

    async fn count_inner(&self) -> Result<u64> {
        let (sql, params) = self.render_count();
        let result = self.db.execute(&sql, &params).await?;
        let row = result
            .rows
            .first()
            .ok_or_else(|| Error::Database("COUNT returned no rows".into()))?;
        Ok(row.int("cnt")? as u64)
    }

    /// Row count; joins count distinct base rows.
    pub async fn count(self) -> Result<u64> {
        self.count_inner().await
    }

    /// One page plus the unpaged total, in two statements.
    pub async fn fetch_page(mut self, page: u64, per_page: u64) -> Result<PageResult<T>> {
        if page < 1 || per_page < 1 {
            return Err(Error::BadQuery(format!(
                "page and per_page must be >= 1, got page={page} per_page={per_page}"
            )));
        }
        let total = self.count_inner().await?;
        self.page = Some((page, per_page));
        let items = self.fetch().await?;
        Ok(PageResult { items, page, per_page, total })
    }

    /// DELETE with the accumulated criteria. Refuses to run without any
    /// criterion; an unconditional delete is always a bug here.
    pub async fn delete(self) -> Result<u64> {
        if self.criteria.is_empty() {
            return Err(Error::BadQuery(
                "refusing DELETE without a WHERE criterion".into(),
            ));
        }
        if !self.joins.is_empty() {
            return Err(Error::BadQuery(
                "DELETE does not support relation criteria".into(),
            ));
        }
        let (where_sql, params) = self.render_where();
        let sql = format!("DELETE FROM `{}`{}", T::table_name(), where_sql);
        let result = self.db.execute(&sql, &params).await?;
        Ok(result.affected_rows)
    }
}
