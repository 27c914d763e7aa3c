use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{DeriveInput, LitStr, Token};

struct SchemaArgs {
    namespace: Option<String>,
    collection: Option<String>,
    required: Vec<String>,
}

pub fn derive_schema(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let args = match extract_args(&input) {
        Ok(args) => args,
        Err(err) => return TokenStream::from(err.to_compile_error()),
    };

    let collection = args
        .collection
        .unwrap_or_else(|| format!("{}s", to_snake_case(&name.to_string())));
    let required = &args.required;

    // Without a namespace the trait default (no default key) applies.
    let default_key = args.namespace.map(|namespace| {
        quote! {
            fn default_key(&self) -> Result<rowkeeper::Key, rowkeeper::StoreError> {
                rowkeeper::Key::new(#namespace, #collection)
            }
        }
    });

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics rowkeeper::Schema for #name #ty_generics #where_clause {
            fn required(&self) -> &[&'static str] {
                &[#(#required),*]
            }

            #default_key
        }
    };

    TokenStream::from(expanded)
}

fn extract_args(input: &DeriveInput) -> syn::Result<SchemaArgs> {
    let mut args = SchemaArgs {
        namespace: None,
        collection: None,
        required: Vec::new(),
    };

    for attr in &input.attrs {
        if !attr.path().is_ident("schema") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("namespace") {
                let value: LitStr = meta.value()?.parse()?;
                args.namespace = Some(value.value());
            } else if meta.path.is_ident("collection") {
                let value: LitStr = meta.value()?.parse()?;
                args.collection = Some(value.value());
            } else if meta.path.is_ident("required") {
                let content;
                syn::parenthesized!(content in meta.input);
                let fields: Punctuated<LitStr, Token![,]> =
                    content.parse_terminated(|input| input.parse::<LitStr>(), Token![,])?;
                args.required.extend(fields.iter().map(LitStr::value));
            } else {
                return Err(meta.error("expected `namespace`, `collection` or `required`"));
            }
            Ok(())
        })?;
    }

    Ok(args)
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}
