//! Procedural macros for `chronosfpga`

use proc_macro::TokenStream;
use quote::quote;
use syn::{
    parse_macro_input,
    DeriveInput,
};

#[proc_macro_derive(RegisterSerde)]
/// Derived on a `packed_struct` register layout to shim in the transport serde traits.
///
/// The packed bytes are the register value, most significant byte first. `Serialize`,
/// `Deserialize`, `PackedStruct` and `TransportResult` must be in scope at the derive site.
pub fn derive_register_serde(tokens: TokenStream) -> TokenStream {
    let input = parse_macro_input!(tokens as DeriveInput);
    let layout = input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let generated = quote! {
        impl #impl_generics Serialize for #layout #ty_generics #where_clause {
            type Chunk = <Self as PackedStruct>::ByteArray;

            fn serialize(&self) -> Self::Chunk {
                self.pack().expect("Packing failed, this shouldn't happen")
            }
        }

        impl #impl_generics Deserialize for #layout #ty_generics #where_clause {
            type Chunk = <Self as PackedStruct>::ByteArray;

            fn deserialize(chunk: Self::Chunk) -> TransportResult<Self> {
                Self::unpack(&chunk).map_err(crate::transport::Error::Packing)
            }
        }
    };
    TokenStream::from(generated)
}
