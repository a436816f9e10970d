use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Type, parse_macro_input, spanned::Spanned};

#[proc_macro_derive(Trackable, attributes(trackable, tracking))]
pub fn derive_trackable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_trackable(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_trackable(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.generics,
            "Trackable does not support generic structs yet",
        ));
    }

    let options = parse_trackable_options(&input.attrs)?;

    let data_struct = match input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Trackable can only be derived for structs",
            ));
        }
    };

    let named_fields = match data_struct.fields {
        Fields::Named(fields) => fields,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Trackable requires named fields",
            ));
        }
    };

    let mut state_field: Option<Ident> = None;
    let mut modified_field: Option<Ident> = None;
    let mut correlation_field: Option<Ident> = None;
    let mut keys = Vec::<(String, Ident)>::new();
    let mut navigations = Vec::<NavigationField>::new();

    for field in named_fields.named {
        let ident = field.ident.clone().ok_or_else(|| {
            syn::Error::new(field.span(), "Trackable requires named fields")
        })?;
        let field_options = parse_tracking_field_options(&field.attrs)?;
        let property_name = field_options
            .name
            .clone()
            .unwrap_or_else(|| ident.to_string().trim_start_matches("r#").to_string());

        let is_state = field_options.state || (!field_options.any_role() && ident == "tracking_state");
        let is_modified =
            field_options.modified || (!field_options.any_role() && ident == "modified_properties");

        if is_state {
            set_once(&mut state_field, ident.clone(), "#[tracking(state)]")?;
            continue;
        }
        if is_modified {
            set_once(&mut modified_field, ident.clone(), "#[tracking(modified)]")?;
            continue;
        }
        if field_options.correlation {
            set_once(&mut correlation_field, ident.clone(), "#[tracking(correlation)]")?;
            continue;
        }
        if field_options.key {
            keys.push((property_name, ident));
            continue;
        }
        if field_options.skip {
            continue;
        }

        if let Some(target) = entity_ref_target(&field.ty, "Option") {
            navigations.push(NavigationField {
                ident,
                property_name,
                target,
                kind: NavigationFieldKind::Reference,
            });
        } else if let Some(target) = entity_ref_target(&field.ty, "Vec") {
            navigations.push(NavigationField {
                ident,
                property_name,
                target,
                kind: NavigationFieldKind::Collection,
            });
        }
    }

    let state_field = state_field.ok_or_else(|| {
        syn::Error::new(
            struct_name.span(),
            "Trackable requires a TrackingState field (named `tracking_state` or marked #[tracking(state)])",
        )
    })?;
    let modified_field = modified_field.ok_or_else(|| {
        syn::Error::new(
            struct_name.span(),
            "Trackable requires a ModifiedProperties field (named `modified_properties` or marked #[tracking(modified)])",
        )
    })?;

    let entity_name = options
        .name
        .unwrap_or_else(|| struct_name.to_string());

    let correlation_fn = correlation_field.map(|field| {
        quote! {
            fn correlation_key(&self) -> ::core::option::Option<::tracksync::CorrelationKey> {
                ::core::clone::Clone::clone(&self.#field)
            }
        }
    });

    let key_arms = keys.iter().map(|(name, ident)| {
        quote! {
            #name => ::tracksync::ToKeyValue::to_key_value(&self.#ident),
        }
    });

    let navigation_body = match &options.navigation_with {
        Some(method) => quote! { self.#method() },
        None => {
            let entries = navigations.iter().map(NavigationField::property_tokens);
            quote! { ::std::vec![#(#entries),*] }
        }
    };

    let reference_arms = navigations
        .iter()
        .filter(|nav| nav.kind == NavigationFieldKind::Reference)
        .map(|nav| {
            let ident = &nav.ident;
            let name = &nav.property_name;
            let target = &nav.target;
            quote! {
                #name => {
                    self.#ident = ::tracksync::core::entity::downcast_related::<#target>(property, related)?;
                    ::core::result::Result::Ok(())
                }
            }
        });

    let collection_arms = navigations
        .iter()
        .filter(|nav| nav.kind == NavigationFieldKind::Collection)
        .map(|nav| {
            let ident = &nav.ident;
            let name = &nav.property_name;
            quote! {
                #name => ::tracksync::core::entity::remove_related(property, &mut self.#ident, index),
            }
        });

    Ok(quote! {
        impl ::tracksync::EntityType for #struct_name {
            const ENTITY_TYPE: &'static str = #entity_name;
        }

        impl ::tracksync::TrackableEntity for #struct_name {
            fn entity_type(&self) -> &'static str {
                <Self as ::tracksync::EntityType>::ENTITY_TYPE
            }

            fn tracking_state(&self) -> ::tracksync::TrackingState {
                self.#state_field
            }

            fn set_tracking_state(&mut self, state: ::tracksync::TrackingState) {
                self.#state_field = state;
            }

            fn modified_properties(&self) -> &::tracksync::ModifiedProperties {
                &self.#modified_field
            }

            fn modified_properties_mut(&mut self) -> &mut ::tracksync::ModifiedProperties {
                &mut self.#modified_field
            }

            #correlation_fn

            fn key_value(&self, property: &str) -> ::core::option::Option<::tracksync::KeyValue> {
                match property {
                    #(#key_arms)*
                    _ => ::core::option::Option::None,
                }
            }

            fn navigation_properties(&self) -> ::std::vec::Vec<::tracksync::NavigationProperty> {
                #navigation_body
            }

            fn set_reference(
                &mut self,
                property: &str,
                related: ::core::option::Option<::tracksync::AnyEntity>,
            ) -> ::tracksync::Result<()> {
                match property {
                    #(#reference_arms)*
                    _ => {
                        let _ = related;
                        ::core::result::Result::Err(
                            ::tracksync::core::entity::unknown_property(#entity_name, property),
                        )
                    }
                }
            }

            fn remove_from_collection(
                &mut self,
                property: &str,
                index: usize,
            ) -> ::tracksync::Result<()> {
                match property {
                    #(#collection_arms)*
                    _ => {
                        let _ = index;
                        ::core::result::Result::Err(
                            ::tracksync::core::entity::unknown_property(#entity_name, property),
                        )
                    }
                }
            }
        }
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum NavigationFieldKind {
    Reference,
    Collection,
}

struct NavigationField {
    ident: Ident,
    property_name: String,
    target: Type,
    kind: NavigationFieldKind,
}

impl NavigationField {
    fn property_tokens(&self) -> TokenStream2 {
        let ident = &self.ident;
        let name = &self.property_name;
        let target = &self.target;
        match self.kind {
            NavigationFieldKind::Reference => quote! {
                ::tracksync::NavigationProperty::reference(
                    #name,
                    <#target as ::tracksync::EntityType>::ENTITY_TYPE,
                    self.#ident.as_ref().map(::tracksync::EntityRef::erase),
                )
            },
            NavigationFieldKind::Collection => quote! {
                ::tracksync::NavigationProperty::collection(
                    #name,
                    <#target as ::tracksync::EntityType>::ENTITY_TYPE,
                    self.#ident.iter().map(::tracksync::EntityRef::erase).collect(),
                )
            },
        }
    }
}

struct TrackableOptions {
    name: Option<String>,
    navigation_with: Option<Ident>,
}

#[derive(Default)]
struct TrackingFieldOptions {
    state: bool,
    modified: bool,
    correlation: bool,
    key: bool,
    skip: bool,
    name: Option<String>,
}

impl TrackingFieldOptions {
    fn any_role(&self) -> bool {
        self.state || self.modified || self.correlation || self.key || self.skip
    }
}

fn set_once(slot: &mut Option<Ident>, ident: Ident, label: &str) -> syn::Result<()> {
    if slot.is_some() {
        return Err(syn::Error::new(
            ident.span(),
            format!("Duplicate {label} field"),
        ));
    }
    *slot = Some(ident);
    Ok(())
}

/// Returns `T` when `ty` is `Wrapper<EntityRef<T>>`.
fn entity_ref_target(ty: &Type, wrapper: &str) -> Option<Type> {
    let outer = last_segment(ty)?;
    if outer.ident != wrapper {
        return None;
    }
    let inner_ty = first_generic_type(outer)?;
    let inner = last_segment(&inner_ty)?;
    if inner.ident != "EntityRef" {
        return None;
    }
    first_generic_type(inner)
}

fn last_segment(ty: &Type) -> Option<&syn::PathSegment> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    type_path.path.segments.last()
}

fn first_generic_type(segment: &syn::PathSegment) -> Option<Type> {
    let syn::PathArguments::AngleBracketed(arguments) = &segment.arguments else {
        return None;
    };

    for arg in &arguments.args {
        if let syn::GenericArgument::Type(ty) = arg {
            return Some(ty.clone());
        }
    }
    None
}

fn parse_tracking_field_options(attrs: &[syn::Attribute]) -> syn::Result<TrackingFieldOptions> {
    let mut options = TrackingFieldOptions::default();

    for attr in attrs {
        if !attr.path().is_ident("tracking") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("state") {
                options.state = true;
                return Ok(());
            }

            if meta.path.is_ident("modified") {
                options.modified = true;
                return Ok(());
            }

            if meta.path.is_ident("correlation") {
                options.correlation = true;
                return Ok(());
            }

            if meta.path.is_ident("key") {
                options.key = true;
                return Ok(());
            }

            if meta.path.is_ident("skip") {
                options.skip = true;
                return Ok(());
            }

            if meta.path.is_ident("name") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                options.name = Some(lit.value());
                return Ok(());
            }

            Err(meta.error(
                "Unsupported #[tracking(...)] option. Supported: state, modified, correlation, key, skip, name = \"...\"",
            ))
        })?;
    }

    let roles = [options.state, options.modified, options.correlation, options.key]
        .iter()
        .filter(|role| **role)
        .count();
    if roles > 1 {
        return Err(syn::Error::new(
            attrs
                .iter()
                .find(|attr| attr.path().is_ident("tracking"))
                .map(|attr| attr.span())
                .unwrap_or_else(proc_macro2::Span::call_site),
            "A field can only have one of #[tracking(state | modified | correlation | key)]",
        ));
    }

    Ok(options)
}

fn parse_trackable_options(attrs: &[syn::Attribute]) -> syn::Result<TrackableOptions> {
    let mut options = TrackableOptions {
        name: None,
        navigation_with: None,
    };

    for attr in attrs {
        if !attr.path().is_ident("trackable") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                options.name = Some(lit.value());
                return Ok(());
            }

            if meta.path.is_ident("navigation_with") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                options.navigation_with = Some(format_ident!("{}", lit.value(), span = lit.span()));
                return Ok(());
            }

            Err(meta.error(
                "Unsupported trackable attribute. Supported: name = \"...\", navigation_with = \"method\"",
            ))
        })?;
    }

    Ok(options)
}
