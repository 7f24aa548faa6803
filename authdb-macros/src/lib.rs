//! Procedural macros for authdb
//!
//! This crate provides the code generator behind the authdb models:
//!
//! - `#[derive(Model)]` - Generate the field enum, column metadata, row decoding
//!   and field access for a table-backed struct

use convert_case::{Case, Casing};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, Data, DeriveInput, Fields, GenericArgument, Ident, Lit, LitStr,
    PathArguments, Type,
};

/// Derive `authdb::orm::Model` for a struct.
///
/// # Usage
///
/// ```ignore
/// #[derive(Model, Debug, Clone)]
/// #[model(table = "session")]
/// pub struct Session {
///     #[model(id, default_uuid)]
///     pub id: String,
///     #[model(unique)]
///     pub token: String,
///     #[model(index, references = "user.id", on_delete = "cascade")]
///     pub user_id: String,
///     #[model(default_now)]
///     pub created_at: DateTime<Utc>,
///     #[model(default_now, updated_at)]
///     pub updated_at: DateTime<Utc>,
/// }
/// ```
///
/// # Generated Code
///
/// For the struct above:
///
/// ```ignore
/// #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// pub enum SessionField { Id, Token, UserId, CreatedAt, UpdatedAt }
///
/// impl ModelField for SessionField { /* column lookup */ }
/// impl Model for Session { /* TABLE, COLUMNS, from_row, get */ }
/// ```
///
/// Field attributes:
/// - `id` - primary key (exactly one per model)
/// - `unique`, `index` - constraints created by schema sync
/// - `default = <literal>`, `default_uuid`, `default_now` - insert defaults
/// - `updated_at` - set to now on every update
/// - `references = "table.column"`, `on_delete = "cascade" | "set_null" | "restrict"`
/// - `column = "name"` - override the snake_case column name
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let parsed = parse_macro_input!(input as DeriveInput);

    match expand_model(&parsed) {
        Ok(output) => output.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Parsed `#[model(...)]` options for one struct field
struct FieldSpec {
    ident: Ident,
    variant: Ident,
    column: String,
    kind: Ident,
    nullable: bool,
    primary_key: bool,
    unique: bool,
    indexed: bool,
    default: Option<TokenStream2>,
    updated_at: bool,
    references: Option<(String, String)>,
    on_delete: Ident,
}

fn expand_model(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let vis = &input.vis;
    let field_enum = format_ident!("{}Field", name);

    let mut table: Option<String> = None;
    for attr in &input.attrs {
        if !attr.path().is_ident("model") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let lit: LitStr = meta.value()?.parse()?;
                table = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error("unsupported model attribute, expected `table`"))
            }
        })?;
    }
    let table = table.unwrap_or_else(|| name.to_string().to_case(Case::Snake));

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Model can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Model can only be derived for structs",
            ));
        }
    };

    let mut specs = Vec::with_capacity(fields.len());
    for field in fields {
        specs.push(parse_field(field)?);
    }

    let primary_keys: Vec<&FieldSpec> = specs.iter().filter(|s| s.primary_key).collect();
    let pk_variant = match primary_keys.as_slice() {
        [pk] => pk.variant.clone(),
        [] => {
            return Err(syn::Error::new_spanned(
                name,
                "Model requires exactly one field marked #[model(id)]",
            ));
        }
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Model supports a single #[model(id)] field",
            ));
        }
    };

    let variants: Vec<&Ident> = specs.iter().map(|s| &s.variant).collect();
    let idents: Vec<&Ident> = specs.iter().map(|s| &s.ident).collect();
    let columns: Vec<&String> = specs.iter().map(|s| &s.column).collect();
    let column_defs: Vec<TokenStream2> = specs.iter().map(column_def_tokens).collect();
    let name_str = name.to_string();

    let output = quote! {
        #[doc = concat!("Fields of [`", #name_str, "`], in column order.")]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #vis enum #field_enum {
            #(#variants),*
        }

        impl #field_enum {
            const ALL: &'static [#field_enum] = &[#(#field_enum::#variants),*];
        }

        impl ::authdb::orm::ModelField for #field_enum {
            fn all() -> &'static [Self] {
                Self::ALL
            }

            fn column(self) -> &'static ::authdb::orm::ColumnDef {
                &<#name as ::authdb::orm::Model>::COLUMNS[self as usize]
            }
        }

        impl ::authdb::orm::Model for #name {
            type Field = #field_enum;

            const NAME: &'static str = #name_str;
            const TABLE: &'static str = #table;
            const COLUMNS: &'static [::authdb::orm::ColumnDef] = &[#(#column_defs),*];
            const PRIMARY_KEY: #field_enum = #field_enum::#pk_variant;

            fn from_row(
                row: &::authdb::__private::SqliteRow,
            ) -> ::std::result::Result<Self, ::authdb::__private::sqlx::Error> {
                use ::authdb::__private::sqlx::Row as _;
                Ok(Self {
                    #(#idents: row.try_get(#columns)?),*
                })
            }

            fn get(&self, field: #field_enum) -> ::authdb::orm::Value {
                match field {
                    #(#field_enum::#variants => ::authdb::orm::Value::from(self.#idents.clone())),*
                }
            }
        }
    };

    Ok(output)
}

fn parse_field(field: &syn::Field) -> syn::Result<FieldSpec> {
    let ident = field
        .ident
        .clone()
        .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;

    let (inner_ty, nullable) = match option_inner(&field.ty) {
        Some(inner) => (inner, true),
        None => (&field.ty, false),
    };

    let mut spec = FieldSpec {
        variant: format_ident!("{}", ident.to_string().to_case(Case::Pascal)),
        column: ident.to_string(),
        kind: column_kind(inner_ty)?,
        ident,
        nullable,
        primary_key: false,
        unique: false,
        indexed: false,
        default: None,
        updated_at: false,
        references: None,
        on_delete: format_ident!("NoAction"),
    };

    for attr in &field.attrs {
        if !attr.path().is_ident("model") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                spec.primary_key = true;
            } else if meta.path.is_ident("unique") {
                spec.unique = true;
            } else if meta.path.is_ident("index") {
                spec.indexed = true;
            } else if meta.path.is_ident("updated_at") {
                spec.updated_at = true;
            } else if meta.path.is_ident("default_uuid") {
                spec.default = Some(quote!(::authdb::orm::DefaultValue::Uuid));
            } else if meta.path.is_ident("default_now") {
                spec.default = Some(quote!(::authdb::orm::DefaultValue::Now));
            } else if meta.path.is_ident("default") {
                let lit: Lit = meta.value()?.parse()?;
                spec.default = Some(default_tokens(&lit)?);
            } else if meta.path.is_ident("column") {
                let lit: LitStr = meta.value()?.parse()?;
                spec.column = lit.value();
            } else if meta.path.is_ident("references") {
                let lit: LitStr = meta.value()?.parse()?;
                let value = lit.value();
                let (table, column) = value.split_once('.').ok_or_else(|| {
                    syn::Error::new_spanned(&lit, "expected `table.column`")
                })?;
                spec.references = Some((table.to_string(), column.to_string()));
            } else if meta.path.is_ident("on_delete") {
                let lit: LitStr = meta.value()?.parse()?;
                spec.on_delete = match lit.value().as_str() {
                    "cascade" => format_ident!("Cascade"),
                    "set_null" => format_ident!("SetNull"),
                    "restrict" => format_ident!("Restrict"),
                    "no_action" => format_ident!("NoAction"),
                    _ => {
                        return Err(syn::Error::new_spanned(
                            &lit,
                            "expected cascade, set_null, restrict or no_action",
                        ));
                    }
                };
            } else {
                return Err(meta.error("unsupported model field attribute"));
            }
            Ok(())
        })?;
    }

    Ok(spec)
}

fn default_tokens(lit: &Lit) -> syn::Result<TokenStream2> {
    match lit {
        Lit::Bool(b) => {
            let value = b.value;
            Ok(quote!(::authdb::orm::DefaultValue::Bool(#value)))
        }
        Lit::Int(i) => {
            let value: i64 = i.base10_parse()?;
            Ok(quote!(::authdb::orm::DefaultValue::Int(#value)))
        }
        Lit::Float(f) => {
            let value: f64 = f.base10_parse()?;
            Ok(quote!(::authdb::orm::DefaultValue::Real(#value)))
        }
        Lit::Str(s) => {
            let value = s.value();
            Ok(quote!(::authdb::orm::DefaultValue::Text(#value)))
        }
        other => Err(syn::Error::new_spanned(
            other,
            "default must be a bool, integer, float or string literal",
        )),
    }
}

fn column_def_tokens(spec: &FieldSpec) -> TokenStream2 {
    let column = &spec.column;
    let field = spec.ident.to_string().to_case(Case::Camel);
    let kind = &spec.kind;
    let nullable = spec.nullable;
    let primary_key = spec.primary_key;
    let unique = spec.unique;
    let indexed = spec.indexed;
    let updated_at = spec.updated_at;

    let default = match &spec.default {
        Some(tokens) => quote!(::std::option::Option::Some(#tokens)),
        None => quote!(::std::option::Option::None),
    };

    let references = match &spec.references {
        Some((table, target)) => {
            let on_delete = &spec.on_delete;
            quote!(::std::option::Option::Some(::authdb::orm::ForeignKey {
                table: #table,
                column: #target,
                on_delete: ::authdb::orm::OnDelete::#on_delete,
            }))
        }
        None => quote!(::std::option::Option::None),
    };

    quote! {
        ::authdb::orm::ColumnDef {
            name: #column,
            field: #field,
            kind: ::authdb::orm::ColumnKind::#kind,
            nullable: #nullable,
            primary_key: #primary_key,
            unique: #unique,
            indexed: #indexed,
            default: #default,
            updated_at: #updated_at,
            references: #references,
        }
    }
}

/// Unwrap `Option<T>` into `T`
fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    match &segment.arguments {
        PathArguments::AngleBracketed(args) => match args.args.first() {
            Some(GenericArgument::Type(inner)) => Some(inner),
            _ => None,
        },
        _ => None,
    }
}

/// Map a Rust field type onto a storage kind
fn column_kind(ty: &Type) -> syn::Result<Ident> {
    let ident = match ty {
        Type::Path(type_path) => type_path.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    };

    let kind = match ident.as_deref() {
        Some("String") => "Text",
        Some("bool") => "Boolean",
        Some("i64" | "i32" | "i16" | "i8" | "u32" | "u16" | "u8") => "Integer",
        Some("f64" | "f32") => "Real",
        Some("DateTime") => "DateTime",
        _ => {
            return Err(syn::Error::new_spanned(
                ty,
                "unsupported column type, expected String, bool, integer, float or DateTime<Utc>",
            ));
        }
    };

    Ok(format_ident!("{}", kind))
}
