//! Implementation of `#[derive(Resource)]`.
//!
//! Parsing fills plain structs from the attribute lists, then codegen
//! emits the `Resource` and `RelationLoad` implementations. The blueprint
//! is built inside a `OnceLock` initializer so attribute interpretation
//! runs once per process; relation targets are stored as function
//! pointers and never invoked during that initializer, which keeps
//! mutually related types from deadlocking each other.

use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{Data, DeriveInput, Error, Fields, LitStr, Result};

#[derive(Debug, Default)]
struct ResourceAttrs {
    table: Option<String>,
    map_to: Option<String>,
}

#[derive(Debug)]
struct IndexAttrs {
    columns: Vec<String>,
    unique: bool,
    name: Option<String>,
}

#[derive(Debug, Default)]
struct ColumnAttrs {
    sql_type: Option<String>,
    length: Option<u32>,
    precision: Option<u8>,
    scale: Option<u8>,
    name: Option<String>,
    nullable: bool,
    default: Option<syn::Lit>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RelationKind {
    BelongsTo,
    HasMany,
    OneToOne,
    ManyToMany,
}

struct RelationAttrs {
    kind: RelationKind,
    target: Option<syn::Path>,
    foreign_key: Option<String>,
    pivot: Option<String>,
    related_key: Option<String>,
    on_delete: Option<String>,
    on_update: Option<String>,
}

struct ColumnField {
    ident: syn::Ident,
    ty: syn::Type,
    column: String,
    attrs: ColumnAttrs,
    primary_key: Option<String>,
    filterable: Option<String>,
    deprecated: bool,
}

struct RelationField {
    ident: syn::Ident,
    property: String,
    target: syn::Path,
    attrs: RelationAttrs,
    optional: bool,
}

pub fn derive_resource(input: TokenStream) -> Result<TokenStream> {
    let input: DeriveInput = syn::parse2(input)?;
    let name = &input.ident;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(Error::new_spanned(
                    name,
                    "Resource requires a struct with named fields",
                ))
            }
        },
        _ => return Err(Error::new_spanned(name, "Resource can only be derived for structs")),
    };

    let resource_attrs = parse_resource_attrs(&input)?;
    let table = resource_attrs.table.ok_or_else(|| {
        Error::new_spanned(name, "missing #[resource(table = \"...\")] attribute")
    })?;
    let indexes = parse_index_attrs(&input)?;
    let tenant = parse_tenant_attr(&input)?;

    let mut columns: Vec<ColumnField> = Vec::new();
    let mut relations: Vec<RelationField> = Vec::new();
    let mut aggregates: Vec<String> = Vec::new();

    for field in fields {
        let ident = field.ident.clone().expect("named field");

        if has_attr(field, "aggregate") {
            // Virtual field: registered by name, no column, no storage.
            aggregates.push(ident.to_string());
            continue;
        }

        if let Some(rel) = parse_relation_attrs(field)? {
            let optional = inner_type(&field.ty, "Option").is_some();
            let target = match rel.target.clone() {
                Some(path) => path,
                None => infer_relation_target(field, rel.kind)?,
            };
            relations.push(RelationField {
                property: ident.to_string(),
                ident,
                target,
                attrs: rel,
                optional,
            });
            continue;
        }

        if let Some(attrs) = parse_column_attrs(field)? {
            let primary_key = parse_primary_key(field)?;
            let filterable = parse_filterable(field, &ident)?;
            let deprecated = has_attr(field, "deprecated_column");
            let column = attrs.name.clone().unwrap_or_else(|| ident.to_string());
            columns.push(ColumnField {
                ty: field.ty.clone(),
                ident,
                column,
                attrs,
                primary_key,
                filterable,
                deprecated,
            });
        }
    }

    if columns.is_empty() {
        return Err(Error::new_spanned(
            name,
            "a resource needs at least one #[column(...)] field",
        ));
    }

    let blueprint_fn = gen_blueprint(
        &table,
        &resource_attrs.map_to,
        &columns,
        &relations,
        &indexes,
        &aggregates,
        tenant,
    )?;
    let apply_fn = gen_apply_column(&columns);
    let collect_fn = gen_collect_columns(&columns);
    let relation_load = gen_relation_load(name, &columns, &relations)?;

    let map_to_assert = resource_attrs.map_to.as_ref().map(|_| {
        quote! {
            const _: fn() = || {
                fn assert_into_domain<T: semitexa_core::resource::IntoDomain>() {}
                let _ = assert_into_domain::<#name>;
            };
        }
    });

    let table_lit = LitStr::new(&table, Span::call_site());

    Ok(quote! {
        impl semitexa_core::resource::Resource for #name {
            fn table_name() -> &'static str {
                #table_lit
            }

            #blueprint_fn

            fn metadata() -> &'static semitexa_core::resource::ResourceMetadata {
                static METADATA: std::sync::OnceLock<semitexa_core::resource::ResourceMetadata> =
                    std::sync::OnceLock::new();
                METADATA.get_or_init(|| {
                    semitexa_core::resource::ResourceMetadata::from_blueprint(
                        <Self as semitexa_core::resource::Resource>::blueprint(),
                    )
                })
            }

            #apply_fn

            #collect_fn
        }

        #relation_load

        #map_to_assert
    })
}

// ---------------------------------------------------------------------------
// Attribute parsing
// ---------------------------------------------------------------------------

fn has_attr(field: &syn::Field, name: &str) -> bool {
    field.attrs.iter().any(|a| a.path().is_ident(name))
}

fn parse_resource_attrs(input: &DeriveInput) -> Result<ResourceAttrs> {
    let mut out = ResourceAttrs::default();
    for attr in &input.attrs {
        if !attr.path().is_ident("resource") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                out.table = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("map_to") {
                out.map_to = Some(meta.value()?.parse::<LitStr>()?.value());
            } else {
                return Err(meta.error("unknown resource attribute"));
            }
            Ok(())
        })?;
    }
    Ok(out)
}

fn parse_index_attrs(input: &DeriveInput) -> Result<Vec<IndexAttrs>> {
    let mut out = Vec::new();
    for attr in &input.attrs {
        if !attr.path().is_ident("resource_index") {
            continue;
        }
        let mut columns = Vec::new();
        let mut unique = false;
        let mut name = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("columns") {
                let raw = meta.value()?.parse::<LitStr>()?.value();
                columns = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            } else if meta.path.is_ident("unique") {
                unique = true;
            } else if meta.path.is_ident("name") {
                name = Some(meta.value()?.parse::<LitStr>()?.value());
            } else {
                return Err(meta.error("unknown resource_index attribute"));
            }
            Ok(())
        })?;
        if columns.is_empty() {
            return Err(Error::new_spanned(attr, "resource_index needs columns = \"...\""));
        }
        out.push(IndexAttrs { columns, unique, name });
    }
    Ok(out)
}

fn parse_tenant_attr(input: &DeriveInput) -> Result<Option<TokenStream>> {
    for attr in &input.attrs {
        if !attr.path().is_ident("tenant_scoped") {
            continue;
        }
        let mut strategy = String::from("same_storage");
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("strategy") {
                strategy = meta.value()?.parse::<LitStr>()?.value();
                Ok(())
            } else {
                Err(meta.error("unknown tenant_scoped attribute"))
            }
        })?;
        return match strategy.as_str() {
            "same_storage" => Ok(Some(quote! {
                semitexa_core::resource::TenantStrategy::SameStorage
            })),
            other => Err(Error::new_spanned(
                attr,
                format!("unknown tenant strategy {other:?}"),
            )),
        };
    }
    Ok(None)
}

fn parse_column_attrs(field: &syn::Field) -> Result<Option<ColumnAttrs>> {
    let mut found = false;
    let mut out = ColumnAttrs::default();
    for attr in &field.attrs {
        if !attr.path().is_ident("column") {
            continue;
        }
        found = true;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("type") {
                out.sql_type = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("length") {
                out.length = Some(meta.value()?.parse::<syn::LitInt>()?.base10_parse()?);
            } else if meta.path.is_ident("precision") {
                out.precision = Some(meta.value()?.parse::<syn::LitInt>()?.base10_parse()?);
            } else if meta.path.is_ident("scale") {
                out.scale = Some(meta.value()?.parse::<syn::LitInt>()?.base10_parse()?);
            } else if meta.path.is_ident("name") {
                out.name = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("nullable") {
                out.nullable = true;
            } else if meta.path.is_ident("default") {
                out.default = Some(meta.value()?.parse()?);
            } else {
                return Err(meta.error("unknown column attribute"));
            }
            Ok(())
        })?;
    }
    if !found {
        return Ok(None);
    }
    if out.sql_type.is_none() {
        return Err(Error::new_spanned(field, "column needs type = \"...\""));
    }
    Ok(Some(out))
}

fn parse_primary_key(field: &syn::Field) -> Result<Option<String>> {
    for attr in &field.attrs {
        if !attr.path().is_ident("primary_key") {
            continue;
        }
        let mut strategy = String::from("auto");
        if let syn::Meta::List(_) = &attr.meta {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("strategy") {
                    strategy = meta.value()?.parse::<LitStr>()?.value();
                    Ok(())
                } else {
                    Err(meta.error("unknown primary_key attribute"))
                }
            })?;
        }
        if !matches!(strategy.as_str(), "auto" | "uuid" | "manual") {
            return Err(Error::new_spanned(
                attr,
                format!("unknown primary key strategy {strategy:?}"),
            ));
        }
        return Ok(Some(strategy));
    }
    Ok(None)
}

fn parse_filterable(field: &syn::Field, ident: &syn::Ident) -> Result<Option<String>> {
    for attr in &field.attrs {
        if !attr.path().is_ident("filterable") {
            continue;
        }
        let mut name = ident.to_string();
        if let syn::Meta::List(_) = &attr.meta {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    name = meta.value()?.parse::<LitStr>()?.value();
                    Ok(())
                } else {
                    Err(meta.error("unknown filterable attribute"))
                }
            })?;
        }
        return Ok(Some(name));
    }
    Ok(None)
}

fn parse_relation_attrs(field: &syn::Field) -> Result<Option<RelationAttrs>> {
    let kinds = [
        ("belongs_to", RelationKind::BelongsTo),
        ("has_many", RelationKind::HasMany),
        ("one_to_one", RelationKind::OneToOne),
        ("many_to_many", RelationKind::ManyToMany),
    ];

    for attr in &field.attrs {
        let Some((_, kind)) = kinds
            .iter()
            .find(|(name, _)| attr.path().is_ident(name))
            .copied()
            .map(|(n, k)| (n, k))
        else {
            continue;
        };

        let mut out = RelationAttrs {
            kind,
            target: None,
            foreign_key: None,
            pivot: None,
            related_key: None,
            on_delete: None,
            on_update: None,
        };
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("target") {
                out.target = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("foreign_key") {
                out.foreign_key = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("pivot") {
                out.pivot = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("related_key") {
                out.related_key = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("on_delete") {
                out.on_delete = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("on_update") {
                out.on_update = Some(meta.value()?.parse::<LitStr>()?.value());
            } else {
                return Err(meta.error("unknown relation attribute"));
            }
            Ok(())
        })?;

        if out.foreign_key.is_none() {
            return Err(Error::new_spanned(attr, "relation needs foreign_key = \"...\""));
        }
        if kind == RelationKind::ManyToMany && (out.pivot.is_none() || out.related_key.is_none()) {
            return Err(Error::new_spanned(
                attr,
                "many_to_many needs pivot = \"...\" and related_key = \"...\"",
            ));
        }
        return Ok(Some(out));
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Type inspection
// ---------------------------------------------------------------------------

fn inner_type<'a>(ty: &'a syn::Type, wrapper: &str) -> Option<&'a syn::Type> {
    let syn::Type::Path(type_path) = ty else { return None };
    let segment = type_path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        syn::GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

fn infer_relation_target(field: &syn::Field, kind: RelationKind) -> Result<syn::Path> {
    let wrapper = match kind {
        RelationKind::BelongsTo | RelationKind::OneToOne => "Option",
        RelationKind::HasMany | RelationKind::ManyToMany => "Vec",
    };
    let inner = inner_type(&field.ty, wrapper).ok_or_else(|| {
        Error::new_spanned(
            field,
            format!("relation field must be {wrapper}<Target>, or use target = Type"),
        )
    })?;
    match inner {
        syn::Type::Path(path) => Ok(path.path.clone()),
        _ => Err(Error::new_spanned(field, "cannot infer relation target from this type")),
    }
}

// ---------------------------------------------------------------------------
// Codegen
// ---------------------------------------------------------------------------

fn sql_type_tokens(name: &str, at: &syn::Ident) -> Result<TokenStream> {
    let variant = match name {
        "varchar" => "Varchar",
        "char" => "Char",
        "text" => "Text",
        "mediumtext" => "MediumText",
        "longtext" => "LongText",
        "tinyint" => "TinyInt",
        "smallint" => "SmallInt",
        "int" => "Int",
        "bigint" => "BigInt",
        "float" => "Float",
        "double" => "Double",
        "decimal" => "Decimal",
        "boolean" | "bool" => "Boolean",
        "datetime" => "DateTime",
        "timestamp" => "Timestamp",
        "date" => "Date",
        "time" => "Time",
        "year" => "Year",
        "json" => "Json",
        "blob" => "Blob",
        "binary" => "Binary",
        other => {
            return Err(Error::new(
                at.span(),
                format!("unknown column type {other:?}"),
            ))
        }
    };
    let ident = syn::Ident::new(variant, Span::call_site());
    Ok(quote! { semitexa_core::schema::MySqlType::#ident })
}

fn pk_strategy_tokens(strategy: &str) -> TokenStream {
    let ident = syn::Ident::new(
        match strategy {
            "uuid" => "Uuid",
            "manual" => "Manual",
            _ => "Auto",
        },
        Span::call_site(),
    );
    quote! { semitexa_core::schema::PkStrategy::#ident }
}

fn fk_action_tokens(action: &str, at: &syn::Ident) -> Result<TokenStream> {
    let variant = match action {
        "restrict" => "Restrict",
        "cascade" => "Cascade",
        "set_null" => "SetNull",
        "no_action" => "NoAction",
        other => {
            return Err(Error::new(
                at.span(),
                format!("unknown referential action {other:?}"),
            ))
        }
    };
    let ident = syn::Ident::new(variant, Span::call_site());
    Ok(quote! { semitexa_core::schema::ForeignKeyAction::#ident })
}

fn option_tokens<T: quote::ToTokens>(value: &Option<T>) -> TokenStream {
    match value {
        Some(v) => quote! { Some(#v) },
        None => quote! { None },
    }
}

fn option_string_tokens(value: &Option<String>) -> TokenStream {
    match value {
        Some(v) => {
            let lit = LitStr::new(v, Span::call_site());
            quote! { Some(#lit.to_string()) }
        }
        None => quote! { None },
    }
}

fn default_tokens(lit: &Option<syn::Lit>) -> Result<TokenStream> {
    let Some(lit) = lit else { return Ok(quote! { None }) };
    let value = match lit {
        syn::Lit::Int(v) => {
            let parsed: i64 = v.base10_parse()?;
            quote! { semitexa_core::value::SqlValue::Int(#parsed) }
        }
        syn::Lit::Float(v) => {
            let parsed: f64 = v.base10_parse()?;
            quote! { semitexa_core::value::SqlValue::Float(#parsed) }
        }
        syn::Lit::Bool(v) => {
            let value = v.value;
            quote! { semitexa_core::value::SqlValue::Bool(#value) }
        }
        syn::Lit::Str(v) => {
            quote! { semitexa_core::value::SqlValue::Text(#v.to_string()) }
        }
        other => {
            return Err(Error::new_spanned(other, "unsupported default literal"));
        }
    };
    Ok(quote! { Some(#value) })
}

#[allow(clippy::too_many_arguments)]
fn gen_blueprint(
    table: &str,
    map_to: &Option<String>,
    columns: &[ColumnField],
    relations: &[RelationField],
    indexes: &[IndexAttrs],
    aggregates: &[String],
    tenant: Option<TokenStream>,
) -> Result<TokenStream> {
    let table_lit = LitStr::new(table, Span::call_site());
    let map_to_tokens = option_string_tokens(map_to);

    let mut field_pushes = Vec::new();
    for column in columns {
        let property = LitStr::new(&column.ident.to_string(), Span::call_site());
        let column_name = LitStr::new(&column.column, Span::call_site());
        let ty = &column.ty;
        let sql_type = sql_type_tokens(
            column.attrs.sql_type.as_deref().expect("checked"),
            &column.ident,
        )?;
        let nullable = column.attrs.nullable;
        let length = option_tokens(&column.attrs.length);
        let precision = option_tokens(&column.attrs.precision);
        let scale = option_tokens(&column.attrs.scale);
        let default = default_tokens(&column.attrs.default)?;
        let primary_key = match &column.primary_key {
            Some(strategy) => {
                let tokens = pk_strategy_tokens(strategy);
                quote! { Some(#tokens) }
            }
            None => quote! { None },
        };
        let filterable = option_string_tokens(&column.filterable);
        let deprecated = column.deprecated;

        field_pushes.push(quote! {
            bp.fields.push(semitexa_core::resource::FieldBlueprint {
                property: #property.to_string(),
                column: #column_name.to_string(),
                sql_type: #sql_type,
                source_type: <#ty as semitexa_core::value::ColumnValue>::type_name().to_string(),
                source_kind: <#ty as semitexa_core::value::ColumnValue>::source_kind(),
                nullable: <#ty as semitexa_core::value::ColumnValue>::nullable() || #nullable,
                length: #length,
                precision: #precision,
                scale: #scale,
                default: #default,
                primary_key: #primary_key,
                filterable: #filterable,
                deprecated: #deprecated,
            });
        });
    }

    let mut relation_pushes = Vec::new();
    for relation in relations {
        let property = LitStr::new(&relation.property, Span::call_site());
        let kind_ident = syn::Ident::new(
            match relation.attrs.kind {
                RelationKind::BelongsTo => "BelongsTo",
                RelationKind::HasMany => "HasMany",
                RelationKind::OneToOne => "OneToOne",
                RelationKind::ManyToMany => "ManyToMany",
            },
            Span::call_site(),
        );
        let target = &relation.target;
        let foreign_key = LitStr::new(
            relation.attrs.foreign_key.as_deref().expect("checked"),
            Span::call_site(),
        );
        let pivot = option_string_tokens(&relation.attrs.pivot);
        let related_key = option_string_tokens(&relation.attrs.related_key);
        let on_delete = match &relation.attrs.on_delete {
            Some(action) => {
                let tokens = fk_action_tokens(action, &relation.ident)?;
                quote! { Some(#tokens) }
            }
            None => quote! { None },
        };
        let on_update = match &relation.attrs.on_update {
            Some(action) => {
                let tokens = fk_action_tokens(action, &relation.ident)?;
                quote! { Some(#tokens) }
            }
            None => quote! { None },
        };

        relation_pushes.push(quote! {
            bp.relations.push(semitexa_core::resource::RelationBlueprint {
                property: #property.to_string(),
                kind: semitexa_core::schema::RelationKind::#kind_ident,
                target: semitexa_core::resource::RelationTarget::Typed(
                    <#target as semitexa_core::resource::Resource>::blueprint,
                ),
                foreign_key: #foreign_key.to_string(),
                pivot_table: #pivot,
                related_key: #related_key,
                on_delete: #on_delete,
                on_update: #on_update,
            });
        });
    }

    let mut index_pushes = Vec::new();
    for index in indexes {
        let columns: Vec<LitStr> = index
            .columns
            .iter()
            .map(|c| LitStr::new(c, Span::call_site()))
            .collect();
        let unique = index.unique;
        let name = option_string_tokens(&index.name);
        index_pushes.push(quote! {
            bp.indexes.push(semitexa_core::resource::IndexBlueprint {
                columns: vec![#(#columns.to_string()),*],
                unique: #unique,
                name: #name,
            });
        });
    }

    let tenant_tokens = match tenant {
        Some(strategy) => quote! { bp.tenant = Some(#strategy); },
        None => quote! {},
    };

    let aggregate_lits: Vec<LitStr> = aggregates
        .iter()
        .map(|a| LitStr::new(a, Span::call_site()))
        .collect();

    Ok(quote! {
        fn blueprint() -> &'static semitexa_core::resource::TableBlueprint {
            static BLUEPRINT: std::sync::OnceLock<semitexa_core::resource::TableBlueprint> =
                std::sync::OnceLock::new();
            BLUEPRINT.get_or_init(|| {
                let mut bp = semitexa_core::resource::TableBlueprint::new(#table_lit);
                bp.map_to = #map_to_tokens;
                #(#field_pushes)*
                #(#relation_pushes)*
                #(#index_pushes)*
                #(bp.aggregates.push(#aggregate_lits.to_string());)*
                #tenant_tokens
                bp
            })
        }
    })
}

fn gen_apply_column(columns: &[ColumnField]) -> TokenStream {
    let arms = columns.iter().map(|column| {
        let column_name = LitStr::new(&column.column, Span::call_site());
        let ident = &column.ident;
        let ty = &column.ty;
        quote! {
            #column_name => {
                self.#ident = <#ty as semitexa_core::value::ColumnValue>::from_value(value)?;
            }
        }
    });

    quote! {
        fn apply_column(
            &mut self,
            column: &str,
            value: semitexa_core::value::SqlValue,
        ) -> semitexa_core::Result<()> {
            match column {
                #(#arms)*
                _ => {}
            }
            Ok(())
        }
    }
}

fn gen_collect_columns(columns: &[ColumnField]) -> TokenStream {
    let entries = columns.iter().map(|column| {
        let column_name = LitStr::new(&column.column, Span::call_site());
        let ident = &column.ident;
        quote! {
            (#column_name, semitexa_core::value::ColumnValue::into_value(self.#ident.clone()))
        }
    });

    quote! {
        fn collect_columns(&self) -> Vec<(&'static str, semitexa_core::value::SqlValue)> {
            vec![#(#entries),*]
        }
    }
}

fn gen_relation_load(
    name: &syn::Ident,
    columns: &[ColumnField],
    relations: &[RelationField],
) -> Result<TokenStream> {
    let mut arms = Vec::new();
    for relation in relations {
        let property = LitStr::new(&relation.property, Span::call_site());
        let rel_ident = &relation.ident;
        let target = &relation.target;

        let body = match relation.attrs.kind {
            RelationKind::BelongsTo => {
                if !relation.optional {
                    return Err(Error::new(
                        relation.ident.span(),
                        "belongs_to relation fields must be Option<Target>",
                    ));
                }
                let fk_name = relation.attrs.foreign_key.as_deref().expect("checked");
                let fk_field = columns
                    .iter()
                    .find(|c| c.column == fk_name)
                    .ok_or_else(|| {
                        Error::new(
                            relation.ident.span(),
                            format!("belongs_to foreign key column {fk_name:?} is not a declared column field"),
                        )
                    })?;
                let fk_ident = &fk_field.ident;
                quote! {
                    semitexa_core::relations::load_belongs_to::<Self, #target>(
                        db,
                        items,
                        &rel,
                        |item| semitexa_core::value::ColumnValue::into_value(item.#fk_ident.clone()),
                        |item, value| item.#rel_ident = Some(value),
                    )
                    .await
                }
            }
            RelationKind::HasMany => quote! {
                semitexa_core::relations::load_has_many::<Self, #target>(
                    db,
                    items,
                    &rel,
                    |item| semitexa_core::resource::Resource::pk_value(item),
                    |item, group| item.#rel_ident = group,
                )
                .await
            },
            RelationKind::OneToOne => {
                if !relation.optional {
                    return Err(Error::new(
                        relation.ident.span(),
                        "one_to_one relation fields must be Option<Target>",
                    ));
                }
                quote! {
                    semitexa_core::relations::load_one_to_one::<Self, #target>(
                        db,
                        items,
                        &rel,
                        |item| semitexa_core::resource::Resource::pk_value(item),
                        |item, value| item.#rel_ident = Some(value),
                    )
                    .await
                }
            }
            RelationKind::ManyToMany => quote! {
                semitexa_core::relations::load_many_to_many::<Self, #target>(
                    db,
                    items,
                    &rel,
                    |item| semitexa_core::resource::Resource::pk_value(item),
                    |item, group| item.#rel_ident = group,
                )
                .await
            },
        };

        arms.push(quote! {
            #property => { #body }
        });
    }

    Ok(quote! {
        impl semitexa_core::relations::RelationLoad for #name {
            fn load_relation<'a>(
                db: &'a dyn semitexa_core::db::DatabaseAdapter,
                items: &'a mut [Self],
                property: &'a str,
            ) -> semitexa_core::BoxFuture<'a, semitexa_core::Result<()>> {
                Box::pin(async move {
                    let rel = <Self as semitexa_core::resource::Resource>::metadata()
                        .relation(property)?
                        .clone();
                    let _ = &rel;
                    match property {
                        #(#arms)*
                        other => Err(semitexa_core::Error::UnknownRelation(other.to_string())),
                    }
                })
            }
        }
    })
}
