//! Derive macros for the Quartz ECS.

use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

/// Marks a plain data struct as storable in component columns.
///
/// Expands to an impl of `quartz_engine::ecs::Component`, which is a marker
/// trait; the type itself needs nothing beyond `Send + Sync + 'static`.
#[proc_macro_derive(Component)]
pub fn derive_component(item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    let name = &input.ident;

    // The absolute path also resolves inside the engine itself, through the
    // `extern crate self as quartz_engine` alias in its lib.rs.
    TokenStream::from(quote! {
        impl ::quartz_engine::ecs::Component for #name {}
    })
}
