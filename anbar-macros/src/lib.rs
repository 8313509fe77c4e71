//! Procedural macros for Anbar.
//!
//! `#[derive(Injectable)]` turns a struct of `Arc<T>` fields into a
//! constructor manifest the container can build without a factory.
//!
//! ```rust,ignore
//! #[derive(Injectable)]
//! struct Widget {
//!     logger: Arc<dyn Logger>,
//!     #[inject(name = "primary")]
//!     db: Arc<Database>,
//!     #[inject(default)]
//!     hits: AtomicU64,
//! }
//! ```

use darling::{FromDeriveInput, FromField, ast};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{DeriveInput, GenericArgument, Ident, Path, PathArguments, Type, parse_macro_input};

#[derive(FromDeriveInput)]
#[darling(attributes(injectable), supports(struct_named))]
struct InjectableInput {
    ident: Ident,
    generics: syn::Generics,
    data: ast::Data<(), InjectField>,
    /// Path of the runtime crate, for users depending on `anbar-container` directly.
    #[darling(rename = "crate", default)]
    krate: Option<Path>,
}

#[derive(FromField)]
#[darling(attributes(inject))]
struct InjectField {
    ident: Option<Ident>,
    ty: Type,
    /// Resolve the named binding instead of the plain type key.
    #[darling(default)]
    name: Option<String>,
    /// Fill with `Default::default()`; contributes no dependency.
    #[darling(default)]
    default: bool,
}

/// Derives `Injectable` for a struct with named fields.
///
/// Every field is an `Arc<T>` resolved by type (or by name with
/// `#[inject(name = "...")]`), or is marked `#[inject(default)]`.
#[proc_macro_derive(Injectable, attributes(inject, injectable))]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match InjectableInput::from_derive_input(&input) {
        Ok(parsed) => expand(parsed).unwrap_or_else(|err| err.to_compile_error()).into(),
        Err(err) => err.write_errors().into(),
    }
}

fn expand(input: InjectableInput) -> Result<TokenStream2, syn::Error> {
    let krate = input.krate.unwrap_or_else(|| syn::parse_quote!(::anbar));
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match input.data {
        ast::Data::Struct(fields) => fields.fields,
        ast::Data::Enum(_) => {
            return Err(syn::Error::new_spanned(ident, "Injectable can only be derived for structs"));
        }
    };

    let mut keys = Vec::new();
    let mut inits = Vec::new();
    let mut errors: Option<syn::Error> = None;

    for field in &fields {
        let Some(name) = &field.ident else {
            continue;
        };

        if field.default {
            inits.push(quote! { #name: ::core::default::Default::default() });
            continue;
        }

        let Some(inner) = arc_inner(&field.ty) else {
            let err = syn::Error::new_spanned(
                &field.ty,
                "Injectable fields must be `Arc<T>`; mark other fields with #[inject(default)]",
            );
            match errors.as_mut() {
                Some(all) => all.combine(err),
                None => errors = Some(err),
            }
            continue;
        };

        keys.push(match &field.name {
            Some(key_name) => quote! { #krate::DependencyKey::named::<#inner>(#key_name) },
            None => quote! { #krate::DependencyKey::of::<#inner>() },
        });
        inits.push(quote! { #name: deps.next::<#inner>()? });
    }

    if let Some(err) = errors {
        return Err(err);
    }

    Ok(quote! {
        impl #impl_generics #krate::Injectable for #ident #ty_generics #where_clause {
            fn dependencies() -> ::std::vec::Vec<#krate::DependencyKey> {
                ::std::vec![#(#keys),*]
            }

            #[allow(unused_variables)]
            fn construct(deps: &mut #krate::Dependencies) -> #krate::Result<Self> {
                ::core::result::Result::Ok(Self {
                    #(#inits),*
                })
            }
        }
    })
}

/// `T` out of `Arc<T>` / `std::sync::Arc<T>`.
fn arc_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let last = path.path.segments.last()?;
    if last.ident != "Arc" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &last.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}
