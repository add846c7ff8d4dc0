//! Shared test fixtures: hand-written resource implementations mirroring
//! the derive macro's output, and a scripted stub adapter.

use std::collections::VecDeque;
use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::db::DatabaseAdapter;
use crate::error::Result;
use crate::relations::{self, RelationLoad};
use crate::resource::{
    FieldBlueprint, RelationBlueprint, RelationTarget, Resource, ResourceMetadata, TableBlueprint,
};
use crate::schema::{MySqlType, PkStrategy, RelationKind};
use crate::value::{ColumnValue, QueryResult, Row, SourceKind, SqlValue};

/// Adapter that replays canned results and records every statement.
#[derive(Default)]
pub struct StubDb {
    pub responses: Mutex<VecDeque<QueryResult>>,
    pub statements: Mutex<Vec<(String, Vec<SqlValue>)>>,
}

impl StubDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, result: QueryResult) {
        self.responses.lock().unwrap().push_back(result);
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        self.push_response(QueryResult { rows, ..Default::default() });
    }

    pub fn statement_count(&self) -> usize {
        self.statements.lock().unwrap().len()
    }

    pub fn statement(&self, i: usize) -> (String, Vec<SqlValue>) {
        self.statements.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl DatabaseAdapter for StubDb {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult> {
        self.statements
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

pub fn row(pairs: Vec<(&str, SqlValue)>) -> Row {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

// ---------------------------------------------------------------------------
// Fixture resources, written the way the derive expands them.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: Option<i64>,
    pub email: String,
    pub active: bool,
    pub orders: Vec<Order>,
    pub profile: Option<Profile>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Order {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub total: f64,
    pub user: Option<User>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tag {
    pub id: Option<i64>,
    pub label: String,
}

fn field(
    property: &str,
    sql_type: MySqlType,
    kind: SourceKind,
    nullable: bool,
) -> FieldBlueprint {
    FieldBlueprint {
        property: property.into(),
        column: property.into(),
        sql_type,
        source_type: "fixture".into(),
        source_kind: kind,
        nullable,
        length: if sql_type == MySqlType::Varchar { Some(255) } else { None },
        precision: None,
        scale: None,
        default: None,
        primary_key: None,
        filterable: None,
        deprecated: false,
    }
}

fn pk_field() -> FieldBlueprint {
    let mut f = field("id", MySqlType::Int, SourceKind::Integer, false);
    f.primary_key = Some(PkStrategy::Auto);
    f
}

impl Resource for User {
    fn table_name() -> &'static str {
        "users"
    }

    fn blueprint() -> &'static TableBlueprint {
        static BP: OnceLock<TableBlueprint> = OnceLock::new();
        BP.get_or_init(|| {
            let mut bp = TableBlueprint::new("users");
            bp.fields.push(pk_field());
            let mut email = field("email", MySqlType::Varchar, SourceKind::Text, false);
            email.filterable = Some("email".into());
            bp.fields.push(email);
            bp.fields.push(field("active", MySqlType::Boolean, SourceKind::Boolean, false));
            bp.relations.push(RelationBlueprint {
                property: "orders".into(),
                kind: RelationKind::HasMany,
                target: RelationTarget::Typed(Order::blueprint),
                foreign_key: "user_id".into(),
                pivot_table: None,
                related_key: None,
                on_delete: None,
                on_update: None,
            });
            bp.relations.push(RelationBlueprint {
                property: "profile".into(),
                kind: RelationKind::OneToOne,
                target: RelationTarget::Typed(Profile::blueprint),
                foreign_key: "user_id".into(),
                pivot_table: None,
                related_key: None,
                on_delete: None,
                on_update: None,
            });
            bp.relations.push(RelationBlueprint {
                property: "tags".into(),
                kind: RelationKind::ManyToMany,
                target: RelationTarget::Typed(Tag::blueprint),
                foreign_key: "user_id".into(),
                pivot_table: Some("user_tags".into()),
                related_key: Some("tag_id".into()),
                on_delete: None,
                on_update: None,
            });
            bp
        })
    }

    fn metadata() -> &'static ResourceMetadata {
        static META: OnceLock<ResourceMetadata> = OnceLock::new();
        META.get_or_init(|| ResourceMetadata::from_blueprint(Self::blueprint()))
    }

    fn apply_column(&mut self, column: &str, value: SqlValue) -> Result<()> {
        match column {
            "id" => self.id = ColumnValue::from_value(value)?,
            "email" => self.email = ColumnValue::from_value(value)?,
            "active" => self.active = ColumnValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }

    fn collect_columns(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("id", self.id.clone().into_value()),
            ("email", self.email.clone().into_value()),
            ("active", self.active.into_value()),
        ]
    }
}

impl RelationLoad for User {
    fn load_relation<'a>(
        db: &'a dyn DatabaseAdapter,
        items: &'a mut [Self],
        property: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let rel = Self::metadata().relation(property)?.clone();
            match property {
                "orders" => {
                    relations::load_has_many::<Self, Order>(
                        db,
                        items,
                        &rel,
                        |item| item.id.clone().into_value(),
                        |item, group| item.orders = group,
                    )
                    .await
                }
                "profile" => {
                    relations::load_one_to_one::<Self, Profile>(
                        db,
                        items,
                        &rel,
                        |item| item.id.clone().into_value(),
                        |item, profile| item.profile = Some(profile),
                    )
                    .await
                }
                "tags" => {
                    relations::load_many_to_many::<Self, Tag>(
                        db,
                        items,
                        &rel,
                        |item| item.id.clone().into_value(),
                        |item, tags| item.tags = tags,
                    )
                    .await
                }
                other => Err(crate::error::Error::UnknownRelation(other.to_string())),
            }
        })
    }
}

impl Resource for Order {
    fn table_name() -> &'static str {
        "orders"
    }

    fn blueprint() -> &'static TableBlueprint {
        static BP: OnceLock<TableBlueprint> = OnceLock::new();
        BP.get_or_init(|| {
            let mut bp = TableBlueprint::new("orders");
            bp.fields.push(pk_field());
            bp.fields.push(field("user_id", MySqlType::Int, SourceKind::Integer, true));
            bp.fields.push(field("total", MySqlType::Double, SourceKind::Float, false));
            bp.relations.push(RelationBlueprint {
                property: "user".into(),
                kind: RelationKind::BelongsTo,
                target: RelationTarget::Typed(User::blueprint),
                foreign_key: "user_id".into(),
                pivot_table: None,
                related_key: None,
                on_delete: None,
                on_update: None,
            });
            bp
        })
    }

    fn metadata() -> &'static ResourceMetadata {
        static META: OnceLock<ResourceMetadata> = OnceLock::new();
        META.get_or_init(|| ResourceMetadata::from_blueprint(Self::blueprint()))
    }

    fn apply_column(&mut self, column: &str, value: SqlValue) -> Result<()> {
        match column {
            "id" => self.id = ColumnValue::from_value(value)?,
            "user_id" => self.user_id = ColumnValue::from_value(value)?,
            "total" => self.total = ColumnValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }

    fn collect_columns(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("id", self.id.clone().into_value()),
            ("user_id", self.user_id.clone().into_value()),
            ("total", self.total.into_value()),
        ]
    }
}

impl RelationLoad for Order {
    fn load_relation<'a>(
        db: &'a dyn DatabaseAdapter,
        items: &'a mut [Self],
        property: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let rel = Self::metadata().relation(property)?.clone();
            match property {
                "user" => {
                    relations::load_belongs_to::<Self, User>(
                        db,
                        items,
                        &rel,
                        |item| item.user_id.clone().into_value(),
                        |item, user| item.user = Some(user),
                    )
                    .await
                }
                other => Err(crate::error::Error::UnknownRelation(other.to_string())),
            }
        })
    }
}

impl Resource for Profile {
    fn table_name() -> &'static str {
        "profiles"
    }

    fn blueprint() -> &'static TableBlueprint {
        static BP: OnceLock<TableBlueprint> = OnceLock::new();
        BP.get_or_init(|| {
            let mut bp = TableBlueprint::new("profiles");
            bp.fields.push(pk_field());
            bp.fields.push(field("user_id", MySqlType::Int, SourceKind::Integer, true));
            let mut bio = field("bio", MySqlType::Text, SourceKind::Text, true);
            bio.length = None;
            bp.fields.push(bio);
            bp
        })
    }

    fn metadata() -> &'static ResourceMetadata {
        static META: OnceLock<ResourceMetadata> = OnceLock::new();
        META.get_or_init(|| ResourceMetadata::from_blueprint(Self::blueprint()))
    }

    fn apply_column(&mut self, column: &str, value: SqlValue) -> Result<()> {
        match column {
            "id" => self.id = ColumnValue::from_value(value)?,
            "user_id" => self.user_id = ColumnValue::from_value(value)?,
            "bio" => self.bio = ColumnValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }

    fn collect_columns(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("id", self.id.clone().into_value()),
            ("user_id", self.user_id.clone().into_value()),
            ("bio", self.bio.clone().into_value()),
        ]
    }
}

impl RelationLoad for Profile {
    fn load_relation<'a>(
        _db: &'a dyn DatabaseAdapter,
        _items: &'a mut [Self],
        property: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        let property = property.to_string();
        Box::pin(async move { Err(crate::error::Error::UnknownRelation(property)) })
    }
}

impl Resource for Tag {
    fn table_name() -> &'static str {
        "tags"
    }

    fn blueprint() -> &'static TableBlueprint {
        static BP: OnceLock<TableBlueprint> = OnceLock::new();
        BP.get_or_init(|| {
            let mut bp = TableBlueprint::new("tags");
            bp.fields.push(pk_field());
            bp.fields.push(field("label", MySqlType::Varchar, SourceKind::Text, false));
            bp
        })
    }

    fn metadata() -> &'static ResourceMetadata {
        static META: OnceLock<ResourceMetadata> = OnceLock::new();
        META.get_or_init(|| ResourceMetadata::from_blueprint(Self::blueprint()))
    }

    fn apply_column(&mut self, column: &str, value: SqlValue) -> Result<()> {
        match column {
            "id" => self.id = ColumnValue::from_value(value)?,
            "label" => self.label = ColumnValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }

    fn collect_columns(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("id", self.id.clone().into_value()),
            ("label", self.label.clone().into_value()),
        ]
    }
}

impl RelationLoad for Tag {
    fn load_relation<'a>(
        _db: &'a dyn DatabaseAdapter,
        _items: &'a mut [Self],
        property: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        let property = property.to_string();
        Box::pin(async move { Err(crate::error::Error::UnknownRelation(property)) })
    }
}
