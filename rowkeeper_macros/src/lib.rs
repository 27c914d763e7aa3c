mod schema;

use proc_macro::TokenStream;

// ============================================================================
// #[derive(Schema)] derive macro
// ============================================================================

/// Derive macro for the `Schema` trait.
///
/// # Usage
///
/// ```ignore
/// #[derive(Schema)]
/// #[schema(namespace = "blog", collection = "posts", required("title", "body"))]
/// struct Post;
///
/// let post = Record::with_schema(Arc::new(Post));
/// ```
///
/// - `namespace = "..."` enables `default_key`: records saved without a key
///   get a fresh row id in this namespace.
/// - `collection = "..."` sets the collection name.
///   If omitted, defaults to snake_case struct name + "s".
/// - `required(...)` lists the fields a record must hold to be saved.
#[proc_macro_derive(Schema, attributes(schema))]
pub fn derive_schema(input: TokenStream) -> TokenStream {
    schema::derive_schema(input)
}
