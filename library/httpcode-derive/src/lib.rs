extern crate proc_macro;

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DataEnum, DataStruct, DeriveInput, Expr, Fields};

/// Derives [HttpCode] from a `#[code(<EXPR>)]` attribute. Structs carry the
/// attribute on the type itself; enums carry one on every variant.
#[proc_macro_derive(HttpCode, attributes(code))]
pub fn derive_httpcode(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = input.ident;
    match input.data {
        Data::Struct(DataStruct { .. }) => {
            let code = code_attribute(&input.attrs)
                .unwrap_or_else(|| panic!("struct {} must have a #[code(<CODE>)] attribute", name));
            quote!(
                impl HttpCode for #name {
                    fn http_code(&self) -> httpcode::Status {
                        #code
                    }
                }
            )
            .into()
        }
        Data::Enum(DataEnum { variants, .. }) => {
            let arms = variants.iter().map(|variant| {
                let v = &variant.ident;
                let code = code_attribute(&variant.attrs).unwrap_or_else(|| {
                    panic!("variant {} is missing its #[code(<CODE>)] attribute", v)
                });
                let fields = match variant.fields {
                    Fields::Unnamed(_) => quote!((..)),
                    Fields::Named(_) => quote!({ .. }),
                    Fields::Unit => quote!(),
                };
                quote! {
                    #name::#v #fields => { #code }
                }
            });
            quote!(
                impl HttpCode for #name {
                    fn http_code(&self) -> httpcode::Status {
                        match self {
                            #(#arms),*
                        }
                    }
                }
            )
            .into()
        }
        Data::Union(..) => panic!("just say no to unions"),
    }
}

fn code_attribute(attrs: &[Attribute]) -> Option<Expr> {
    attrs
        .iter()
        .find(|attr| attr.path.is_ident("code"))
        .map(|attr| attr.parse_args().expect("malformed #[code(..)] attribute"))
}
