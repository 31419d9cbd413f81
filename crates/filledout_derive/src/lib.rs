use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Field, Fields, Type, parse_macro_input};

enum FieldShape {
    Leaf,
    List,
    Nested,
}

#[proc_macro_derive(FormModel, attributes(form))]
pub fn derive_form_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(error) => error.to_compile_error().into(),
    }
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "FormModel derive currently supports only non-generic structs",
        ));
    }

    let vis = input.vis;
    let model_ident = input.ident;
    let fields_struct_ident = format_ident!("{model_ident}Fields");

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return Err(syn::Error::new(
                    Span::call_site(),
                    "FormModel derive requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                Span::call_site(),
                "FormModel derive is only supported on structs",
            ));
        }
    };
    if named_fields.is_empty() {
        return Err(syn::Error::new_spanned(
            &model_ident,
            "FormModel derive requires at least one field",
        ));
    }

    let krate = filledout_path();
    let mut lens_defs = Vec::new();
    let mut field_decls = Vec::new();
    let mut field_builders = Vec::new();

    for field in named_fields {
        let shape = field_shape(&field)?;
        let Some(field_ident) = field.ident else {
            continue;
        };
        let field_ty = field.ty;
        let field_name = field_ident.to_string();
        let lens_ident = format_ident!("{model_ident}{}Lens", to_pascal_case(&field_name));

        lens_defs.push(quote! {
            #[derive(Clone, Copy, Debug, Default)]
            #vis struct #lens_ident;

            impl #krate::form::FieldLens<#model_ident> for #lens_ident {
                type Value = #field_ty;

                fn name(self) -> #krate::form::FieldName {
                    #krate::form::FieldName::from(#field_name)
                }

                fn get<'a>(self, model: &'a #model_ident) -> &'a Self::Value {
                    &model.#field_ident
                }

                fn get_mut<'a>(self, model: &'a mut #model_ident) -> &'a mut Self::Value {
                    &mut model.#field_ident
                }
            }
        });

        let lens_at = quote!(#krate::form::Compose<P, #lens_ident>);
        let compose = quote!(#krate::form::Compose::new(at, #lens_ident));
        let (field_ty_tokens, builder) = match shape {
            FieldShape::Leaf => (
                quote!(#krate::form::Field<R, #lens_at>),
                quote!(graph.field(#compose)?),
            ),
            FieldShape::List => (
                quote!(#krate::form::ListField<R, #lens_at>),
                quote!(graph.list(#compose)?),
            ),
            FieldShape::Nested => (
                quote! {
                    #krate::form::NestedField<
                        R,
                        #lens_at,
                        <#field_ty as #krate::form::FormModel>::Fields<R, #lens_at>,
                    >
                },
                quote!(graph.nested::<_, #field_ty>(#compose)?),
            ),
        };
        field_decls.push(quote!(#vis #field_ident: #field_ty_tokens));
        field_builders.push(quote!(#field_ident: #builder));
    }

    Ok(quote! {
        #vis struct #fields_struct_ident<R, P>
        where
            R: #krate::reactive::StoreValue,
            P: #krate::form::FieldLens<R, Value = #model_ident>,
        {
            #(#field_decls,)*
        }

        impl #krate::form::FormModel for #model_ident {
            type Fields<R, P>
                = #fields_struct_ident<R, P>
            where
                R: #krate::reactive::StoreValue,
                P: #krate::form::FieldLens<R, Value = Self>;

            fn build_fields<R, P>(
                graph: &mut #krate::form::FieldGraph<R>,
                at: P,
            ) -> #krate::form::FormResult<Self::Fields<R, P>>
            where
                R: #krate::reactive::StoreValue,
                P: #krate::form::FieldLens<R, Value = Self>,
            {
                Ok(#fields_struct_ident {
                    #(#field_builders,)*
                })
            }
        }

        #(#lens_defs)*
    })
}

fn field_shape(field: &Field) -> syn::Result<FieldShape> {
    let mut nested = false;
    for attr in &field.attrs {
        if !attr.path().is_ident("form") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("nested") {
                nested = true;
                Ok(())
            } else {
                Err(meta.error("unsupported form attribute; expected `nested`"))
            }
        })?;
    }
    if nested {
        return Ok(FieldShape::Nested);
    }
    if is_vec(&field.ty) {
        return Ok(FieldShape::List);
    }
    Ok(FieldShape::Leaf)
}

fn is_vec(ty: &Type) -> bool {
    let Type::Path(path) = ty else {
        return false;
    };
    path.qself.is_none()
        && path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Vec")
}

fn filledout_path() -> TokenStream2 {
    match crate_name("filledout") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::filledout),
    }
}

fn to_pascal_case(input: &str) -> String {
    let mut out = String::new();
    for segment in input.split('_') {
        if segment.is_empty() {
            continue;
        }
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}
