//! Schema collector.
//!
//! Turns registered resource blueprints into a validated [`DeclaredSchema`].
//! Findings are accumulated and returned alongside the schema; the collector
//! never fails part-way. Any error aborts sync before the database is
//! touched.

use indexmap::IndexMap;

use crate::resource::{Resource, TableBlueprint, TenantStrategy};
use crate::value::SourceKind;

use super::{
    valid_identifier, ColumnDefinition, DeclaredSchema, ForeignKeyAction, ForeignKeyDefinition,
    IndexDefinition, MySqlType, PkStrategy, RelationKind, RelationMeta, TableDefinition,
};

/// Outcome of one collection pass.
#[derive(Debug, Default)]
pub struct SchemaCollection {
    pub schema: DeclaredSchema,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl SchemaCollection {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Collapse findings into a fatal error for sync entry points.
    pub fn into_result(self) -> crate::error::Result<DeclaredSchema> {
        if self.errors.is_empty() {
            Ok(self.schema)
        } else {
            Err(crate::error::Error::Validation(self.errors.join("; ")))
        }
    }
}

/// Gathers blueprints from annotated types and builds the declared schema.
#[derive(Default)]
pub struct SchemaCollector {
    blueprints: Vec<TableBlueprint>,
}

impl SchemaCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an annotated resource type.
    pub fn register<T: Resource>(mut self) -> Self {
        self.blueprints.push(T::blueprint().clone());
        self
    }

    /// Register a hand-built blueprint (tests, dynamic schemas).
    pub fn register_blueprint(mut self, blueprint: TableBlueprint) -> Self {
        self.blueprints.push(blueprint);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.blueprints.is_empty()
    }

    /// Run the full collection pipeline.
    pub fn collect(&self) -> SchemaCollection {
        let mut out = SchemaCollection::default();
        let mut tables: IndexMap<String, TableDefinition> = IndexMap::new();

        for bp in &self.blueprints {
            match self.build_table(bp, &mut out) {
                Some(table) => {
                    if tables.contains_key(&table.name) {
                        out.errors.push(format!("table {} declared twice", table.name));
                    } else {
                        tables.insert(table.name.clone(), table);
                    }
                }
                None => continue,
            }
        }

        self.synthesize_pivots(&mut tables, &mut out);
        self.resolve_foreign_keys(&mut tables, &mut out);
        self.post_validate(&tables, &mut out);

        out.schema = DeclaredSchema { tables };
        for warning in &out.warnings {
            log::warn!("schema collector: {warning}");
        }
        out
    }

    fn build_table(&self, bp: &TableBlueprint, out: &mut SchemaCollection) -> Option<TableDefinition> {
        if !valid_identifier(&bp.table) {
            out.errors.push(format!("invalid table identifier: {:?}", bp.table));
            return None;
        }

        let mut table = TableDefinition::new(&bp.table);

        for field in &bp.fields {
            if !valid_identifier(&field.column) {
                out.errors.push(format!(
                    "{}.{}: invalid column identifier {:?}",
                    bp.table, field.property, field.column
                ));
                continue;
            }
            // Later duplicates come from shared mixins and merge silently.
            if table.columns.contains_key(&field.column) {
                continue;
            }

            if !source_compatible(field.sql_type, field.source_kind) {
                out.errors.push(format!(
                    "{}.{}: source type {} is not compatible with column type {}",
                    bp.table,
                    field.property,
                    field.source_type,
                    field.sql_type.as_str()
                ));
            }

            let mut column = ColumnDefinition {
                name: field.column.clone(),
                property_name: field.property.clone(),
                sql_type: field.sql_type,
                source_type: field.source_type.clone(),
                source_kind: field.source_kind,
                nullable: field.nullable,
                length: field.length,
                precision: field.precision,
                scale: field.scale,
                default: field.default.clone(),
                is_primary_key: false,
                pk_strategy: PkStrategy::Auto,
                is_deprecated: field.deprecated,
            };

            if let Some(strategy) = field.primary_key {
                column.is_primary_key = true;
                column.pk_strategy = strategy;
                // A primary key is never nullable, whatever the field says.
                column.nullable = false;

                if strategy == PkStrategy::Auto && field.source_kind == SourceKind::Text {
                    out.errors.push(format!(
                        "{}.{}: string-typed primary key cannot use the auto strategy",
                        bp.table, field.property
                    ));
                }
                if strategy == PkStrategy::Uuid
                    && !matches!(field.sql_type, MySqlType::Binary | MySqlType::Varchar)
                {
                    out.errors.push(format!(
                        "{}.{}: uuid primary keys need a binary or varchar column, got {}",
                        bp.table,
                        field.property,
                        field.sql_type.as_str()
                    ));
                }
            }

            if field.filterable.is_some() {
                let index = IndexDefinition {
                    columns: vec![field.column.clone()],
                    unique: false,
                    name: None,
                };
                let name = index.resolved_name(&bp.table);
                if !table.indexes.iter().any(|i| i.resolved_name(&bp.table) == name) {
                    table.indexes.push(index);
                }
            }

            table.columns.insert(field.column.clone(), column);
        }

        for index in &bp.indexes {
            if let Some(name) = &index.name {
                if !valid_identifier(name) {
                    out.errors.push(format!("{}: invalid index name {:?}", bp.table, name));
                    continue;
                }
            }
            table.indexes.push(IndexDefinition {
                columns: index.columns.clone(),
                unique: index.unique,
                name: index.name.clone(),
            });
        }

        if bp.tenant == Some(TenantStrategy::SameStorage)
            && !table.columns.contains_key("tenant_id")
        {
            table.columns.insert(
                "tenant_id".to_string(),
                ColumnDefinition {
                    name: "tenant_id".into(),
                    property_name: "tenant_id".into(),
                    sql_type: MySqlType::Varchar,
                    source_type: "String".into(),
                    source_kind: SourceKind::Text,
                    nullable: false,
                    length: Some(64),
                    precision: None,
                    scale: None,
                    default: None,
                    is_primary_key: false,
                    pk_strategy: PkStrategy::Auto,
                    is_deprecated: false,
                },
            );
        }

        for rel in &bp.relations {
            let meta = RelationMeta {
                property: rel.property.clone(),
                kind: rel.kind,
                target_table: rel.target.table(),
                target_pk: rel.target.pk_column(),
                foreign_key: rel.foreign_key.clone(),
                pivot_table: rel.pivot_table.clone(),
                related_key: rel.related_key.clone(),
                on_delete: rel.on_delete,
                on_update: rel.on_update,
            };
            if rel.kind == RelationKind::ManyToMany
                && (meta.pivot_table.is_none() || meta.related_key.is_none())
            {
                out.errors.push(format!(
                    "{}.{}: many-to-many relations need pivot and related_key",
                    bp.table, rel.property
                ));
                continue;
            }
            table.relations.insert(rel.property.clone(), meta);
        }

        Some(table)
    }

    /// Synthesize pivot tables that no resource declares explicitly.
    fn synthesize_pivots(
        &self,
        tables: &mut IndexMap<String, TableDefinition>,
        out: &mut SchemaCollection,
    ) {
        let mut pivots: Vec<(String, String, String)> = Vec::new();
        for table in tables.values() {
            for rel in table.relations.values() {
                if rel.kind != RelationKind::ManyToMany {
                    continue;
                }
                let (Some(pivot), Some(related)) = (&rel.pivot_table, &rel.related_key) else {
                    continue;
                };
                if !valid_identifier(pivot) {
                    out.errors.push(format!("invalid pivot table identifier: {pivot:?}"));
                    continue;
                }
                pivots.push((pivot.clone(), rel.foreign_key.clone(), related.clone()));
            }
        }

        for (pivot, fk, related) in pivots {
            if tables.contains_key(&pivot) {
                continue;
            }
            let mut table = TableDefinition::new(&pivot);
            table.columns.insert(
                "id".into(),
                int_column("id", "id", false, Some(PkStrategy::Auto)),
            );
            table.columns.insert(fk.clone(), int_column(&fk, &fk, false, None));
            table
                .columns
                .insert(related.clone(), int_column(&related, &related, false, None));
            table.indexes.push(IndexDefinition {
                columns: vec![fk.clone(), related.clone()],
                unique: true,
                name: None,
            });
            tables.insert(pivot, table);
        }
    }

    /// Compute owner sides and emit one FK constraint per relation edge.
    fn resolve_foreign_keys(
        &self,
        tables: &mut IndexMap<String, TableDefinition>,
        out: &mut SchemaCollection,
    ) {
        let mut resolved: Vec<(ForeignKeyDefinition, bool)> = Vec::new();

        let snapshot = tables.clone();
        for table in snapshot.values() {
            for rel in table.relations.values() {
                match rel.kind {
                    RelationKind::BelongsTo => {
                        self.push_fk(
                            &snapshot,
                            &mut resolved,
                            out,
                            &table.name,
                            &rel.foreign_key,
                            &rel.target_table,
                            &rel.target_pk,
                            rel.on_delete,
                            rel.on_update,
                        );
                    }
                    RelationKind::HasMany | RelationKind::OneToOne => {
                        let parent_pk = match snapshot[&table.name].primary_key() {
                            Some(pk) => pk.name.clone(),
                            None => {
                                out.warnings.push(format!(
                                    "{}.{}: parent table has no primary key, skipping constraint",
                                    table.name, rel.property
                                ));
                                continue;
                            }
                        };
                        if !snapshot.contains_key(&rel.target_table) {
                            out.warnings.push(format!(
                                "{}.{}: target table {} is not declared, skipping constraint",
                                table.name, rel.property, rel.target_table
                            ));
                            continue;
                        }
                        self.push_fk(
                            &snapshot,
                            &mut resolved,
                            out,
                            &rel.target_table,
                            &rel.foreign_key,
                            &table.name,
                            &parent_pk,
                            rel.on_delete,
                            rel.on_update,
                        );
                    }
                    RelationKind::ManyToMany => {
                        let (Some(pivot), Some(related)) = (&rel.pivot_table, &rel.related_key)
                        else {
                            continue;
                        };
                        let parent_pk = snapshot[&table.name]
                            .primary_key()
                            .map(|c| c.name.clone())
                            .unwrap_or_else(|| "id".into());
                        self.push_fk(
                            &snapshot,
                            &mut resolved,
                            out,
                            pivot,
                            &rel.foreign_key,
                            &table.name,
                            &parent_pk,
                            rel.on_delete,
                            rel.on_update,
                        );
                        self.push_fk(
                            &snapshot,
                            &mut resolved,
                            out,
                            pivot,
                            related,
                            &rel.target_table,
                            &rel.target_pk,
                            rel.on_delete,
                            rel.on_update,
                        );
                    }
                }
            }
        }

        for (fk, _) in resolved {
            if let Some(table) = tables.get_mut(&fk.table) {
                table.foreign_keys.push(fk);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_fk(
        &self,
        tables: &IndexMap<String, TableDefinition>,
        resolved: &mut Vec<(ForeignKeyDefinition, bool)>,
        out: &mut SchemaCollection,
        owner: &str,
        column: &str,
        referenced_table: &str,
        referenced_column: &str,
        on_delete: Option<ForeignKeyAction>,
        on_update: Option<ForeignKeyAction>,
    ) {
        let Some(owner_table) = tables.get(owner) else {
            out.warnings.push(format!(
                "foreign key {owner}.{column}: owner table is not declared"
            ));
            return;
        };
        let Some(fk_column) = owner_table.columns.get(column) else {
            out.errors.push(format!(
                "foreign key column {column} does not exist on table {owner}"
            ));
            return;
        };
        if !tables.contains_key(referenced_table) {
            out.warnings.push(format!(
                "foreign key {owner}.{column}: referenced table {referenced_table} is not \
                 declared, skipping constraint"
            ));
            return;
        }

        // Nullable FK columns default to SET NULL so parent deletes don't
        // brick the child rows; NOT NULL columns default to RESTRICT.
        let implicit = if fk_column.nullable {
            ForeignKeyAction::SetNull
        } else {
            ForeignKeyAction::Restrict
        };

        let explicit = on_delete.is_some() || on_update.is_some();
        let fk = ForeignKeyDefinition {
            table: owner.to_string(),
            column: column.to_string(),
            referenced_table: referenced_table.to_string(),
            referenced_column: referenced_column.to_string(),
            on_delete: on_delete.unwrap_or(implicit),
            on_update: on_update.unwrap_or(implicit),
        };

        let name = fk.constraint_name();
        if let Some((existing, existing_explicit)) = resolved
            .iter_mut()
            .find(|(f, _)| f.constraint_name() == name)
        {
            // Both ends of a relation may declare the same edge; an
            // explicit action wins over a nullability-derived one.
            if *existing == fk {
                return;
            }
            if explicit && !*existing_explicit {
                *existing = fk;
                *existing_explicit = true;
            } else if !explicit && *existing_explicit {
                // Implicit duplicate of an explicit edge; nothing to do.
            } else {
                out.warnings.push(format!(
                    "conflicting declarations for constraint {name}, keeping the first"
                ));
            }
            return;
        }
        resolved.push((fk, explicit));
    }

    fn post_validate(&self, tables: &IndexMap<String, TableDefinition>, out: &mut SchemaCollection) {
        for table in tables.values() {
            let pk_count = table.columns.values().filter(|c| c.is_primary_key).count();
            match pk_count {
                0 => out
                    .warnings
                    .push(format!("table {} has no primary key", table.name)),
                1 => {}
                n => out.errors.push(format!(
                    "table {} declares {n} primary keys, exactly one is allowed",
                    table.name
                )),
            }

            for index in &table.indexes {
                for column in &index.columns {
                    if !table.columns.contains_key(column) {
                        out.errors.push(format!(
                            "index {} references unknown column {}.{}",
                            index.resolved_name(&table.name),
                            table.name,
                            column
                        ));
                    }
                }
            }

            for column in table.columns.values() {
                if !column.is_deprecated {
                    continue;
                }
                let in_index = table
                    .indexes
                    .iter()
                    .any(|i| i.columns.contains(&column.name));
                let in_fk = table.foreign_keys.iter().any(|f| f.column == column.name);
                if in_index || in_fk {
                    out.warnings.push(format!(
                        "deprecated column {}.{} is still referenced by an index or foreign key",
                        table.name, column.name
                    ));
                }
            }
        }
    }
}

fn int_column(name: &str, property: &str, nullable: bool, pk: Option<PkStrategy>) -> ColumnDefinition {
    ColumnDefinition {
        name: name.to_string(),
        property_name: property.to_string(),
        sql_type: MySqlType::Int,
        source_type: "i64".into(),
        source_kind: SourceKind::Integer,
        nullable,
        length: None,
        precision: None,
        scale: None,
        default: None,
        is_primary_key: pk.is_some(),
        pk_strategy: pk.unwrap_or_default(),
        is_deprecated: false,
    }
}

/// The collector's compatibility matrix between declared in-memory kinds
/// and MySQL column types.
pub fn source_compatible(sql: MySqlType, kind: SourceKind) -> bool {
    use MySqlType as T;
    use SourceKind as K;
    match sql {
        T::Varchar | T::Char => matches!(kind, K::Text | K::Uuid),
        T::Text | T::MediumText | T::LongText => kind == K::Text,
        T::Time => matches!(kind, K::Text | K::Time),
        T::Json => matches!(kind, K::Text | K::Json),
        T::TinyInt | T::SmallInt | T::Int | T::BigInt | T::Year => kind == K::Integer,
        T::Float | T::Double => kind == K::Float,
        T::Decimal => matches!(kind, K::Text | K::Float | K::Decimal),
        T::Boolean => matches!(kind, K::Boolean | K::Integer),
        T::DateTime | T::Timestamp => matches!(kind, K::DateTime | K::Text),
        T::Date => matches!(kind, K::Date | K::DateTime | K::Text),
        T::Blob | T::Binary => matches!(kind, K::Bytes | K::Text | K::Uuid),
    }
}
