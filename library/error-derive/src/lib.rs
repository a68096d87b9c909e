extern crate proc_macro;

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

/// VcrError is a marker trait, so its derivation is nothing more than an
/// empty impl block for the annotated type.
#[proc_macro_derive(VcrError)]
pub fn vcr_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = input.ident;
    quote!(
        impl VcrError for #name {}
    )
    .into()
}
