extern crate proc_macro;

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DataEnum, DataStruct, DataUnion, DeriveInput, Fields};

/// Derives [Kind] for structs and enums. Structs report their type name.
/// Enum variants report `TypeName::VariantName` regardless of the shape of
/// the variant's fields. Unions are rejected outright.
#[proc_macro_derive(Kind)]
pub fn kind(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = input.ident;
    match input.data {
        Data::Struct(DataStruct { .. }) => quote!(
            impl Kind for #name {
                fn kind(&self) -> String {
                    stringify!(#name).to_string()
                }
            }
        ),
        Data::Enum(DataEnum { variants, .. }) => {
            let arms = variants.iter().map(|variant| {
                let v = &variant.ident;
                // The pattern has to swallow the variant's payload, if any,
                // before we can hand back the stringified name.
                let fields = match variant.fields {
                    Fields::Unnamed(_) => quote!((..)),
                    Fields::Named(_) => quote!({ .. }),
                    Fields::Unit => quote!(),
                };
                quote! {
                    #name::#v #fields => concat!(stringify!(#name), "::", stringify!(#v)).to_string()
                }
            });
            quote!(
                impl Kind for #name {
                    fn kind(&self) -> String {
                        match self {
                            #(#arms),*
                        }
                    }
                }
            )
        }
        Data::Union(DataUnion { .. }) => {
            panic!("kind_derive does not support unions. Please implement Kind by hand.")
        }
    }
    .into()
}
