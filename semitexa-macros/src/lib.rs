//! Procedural macros for Semitexa resources.
//!
//! This crate provides the derive that turns annotated structs into ORM
//! resources: a static table blueprint, column get/set by database name,
//! and batched relation loaders.

use proc_macro::TokenStream;

mod resource;

/// Derive macro for ORM resources.
///
/// The annotated struct must also be `Clone` and `Default`. Every
/// persisted field carries a `#[column(...)]` attribute; fields without
/// one are invisible to the ORM (relation fields carry their own
/// attribute instead).
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Resource, Debug, Clone, Default)]
/// #[resource(table = "orders")]
/// #[resource_index(columns = "user_id,created_at")]
/// struct Order {
///     #[column(type = "int")]
///     #[primary_key]
///     id: Option<i64>,
///
///     #[column(type = "int", nullable)]
///     user_id: Option<i64>,
///
///     #[column(type = "decimal", precision = 10, scale = 2)]
///     #[filterable]
///     total: rust_decimal::Decimal,
///
///     #[belongs_to(foreign_key = "user_id")]
///     user: Option<User>,
/// }
/// ```
///
/// Supported attributes:
///
/// - `#[resource(table = "...", map_to = "Domain")]` on the struct
/// - `#[resource_index(columns = "a,b", unique, name = "...")]`
///   (repeatable) for class-level indexes
/// - `#[tenant_scoped(strategy = "same_storage")]`
/// - `#[column(type = "...", length, precision, scale, name, default,
///   nullable)]`
/// - `#[primary_key]` / `#[primary_key(strategy = "auto" | "uuid" |
///   "manual")]`
/// - `#[filterable]` / `#[filterable(name = "...")]`
/// - `#[deprecated_column]`, `#[aggregate]`
/// - `#[belongs_to(foreign_key = "...")]`, `#[has_many(...)]`,
///   `#[one_to_one(...)]`,
///   `#[many_to_many(pivot = "...", foreign_key = "...",
///   related_key = "...")]`, each accepting optional `target = Type`,
///   `on_delete = "..."` and `on_update = "..."`; the target defaults to
///   the field's `Option<T>` / `Vec<T>` element type.
#[proc_macro_derive(
    Resource,
    attributes(
        resource,
        resource_index,
        tenant_scoped,
        column,
        primary_key,
        filterable,
        deprecated_column,
        aggregate,
        belongs_to,
        has_many,
        one_to_one,
        many_to_many
    )
)]
pub fn derive_resource(input: TokenStream) -> TokenStream {
    resource::derive_resource(input.into())
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
