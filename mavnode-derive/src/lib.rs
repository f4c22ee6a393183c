//! Derive macros for [mavnode](https://crates.io/crates/mavnode) MAVLink
//! messages and enums.
//!
//! The macros turn user-declared Rust types into the static per-message
//! metadata consumed by the mavnode layout reflector:
//!
//! * [`macro@Message`] — implements `mavnode::protocol::Message` for a struct
//!   and emits its `MessageSpec` (message `ID`, wire name, ordered field
//!   descriptors, loader).
//! * [`macro@Enum`] — implements `mavnode::protocol::FieldValue` for a
//!   fieldless enum, serializing it as its `#[repr(...)]` integer.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::spanned::Spanned;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Error, Expr, Fields, Ident, Lit, LitInt,
    LitStr, Result, Type,
};

/// Derives `mavnode::protocol::Message` for a struct with named fields.
///
/// # Attributes
///
/// * `#[message_id(N)]` — required, the MAVLink message `ID` (up to 24 bits).
/// * `#[message_name("NAME")]` — overrides the wire name derived from the
///   struct name (`CamelCase` → `UPPER_SNAKE_CASE`).
/// * `#[base_type(u8)]` — marks a field as an enum over the given primitive.
/// * `#[string_len(N)]` — declared length of a `String` field (`char[N]` on
///   the wire).
/// * `#[field_name("name")]` — overrides the wire name of a field (the
///   default is the field identifier with a single trailing `_` stripped).
/// * `#[extension]` — marks a MAVLink 2 extension field.
#[proc_macro_derive(
    Message,
    attributes(message_id, message_name, base_type, string_len, field_name, extension)
)]
pub fn derive_message(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_message(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Derives `mavnode::protocol::FieldValue` for a fieldless `#[repr(...)]`
/// enum, so it can be used as a message field together with
/// `#[base_type(...)]`.
///
/// The enum must be `Copy` and its `#[repr(...)]` must match the
/// `#[base_type(...)]` declared at the use sites.
#[proc_macro_derive(Enum)]
pub fn derive_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_enum(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

///////////////////////////////////////////////////////////////////////////////
//                                 MESSAGE                                   //
///////////////////////////////////////////////////////////////////////////////

struct MessageField {
    ident: Ident,
    wire_name: String,
    kind: Ident,
    array_len: usize,
    array: bool,
    extension: bool,
}

fn expand_message(input: &DeriveInput) -> Result<TokenStream2> {
    let ident = &input.ident;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(Error::new(
                    input.span(),
                    "Message can be derived only for structs with named fields",
                ))
            }
        },
        _ => return Err(Error::new(input.span(), "Message can be derived only for structs")),
    };

    let message_id = parse_message_id(&input.attrs, input.span())?;
    let message_name = match find_str_attr(&input.attrs, "message_name")? {
        Some(name) => name,
        None => camel_to_upper_snake(&ident.to_string()),
    };

    let mut parsed = Vec::new();
    for field in fields {
        parsed.push(parse_field(field)?);
    }

    let field_specs = parsed.iter().map(|field| {
        let name = &field.wire_name;
        let kind = &field.kind;
        let array_len = field.array_len;
        let array = field.array;
        let extension = field.extension;
        quote! {
            ::mavnode::protocol::FieldSpec {
                name: #name,
                kind: ::mavnode::protocol::FieldKind::#kind,
                array_len: #array_len,
                array: #array,
                extension: #extension,
            }
        }
    });

    let store_fields = parsed.iter().map(|field| {
        let ident = &field.ident;
        quote! { writer.put(&self.#ident); }
    });

    let load_fields = parsed.iter().map(|field| {
        let ident = &field.ident;
        quote! { #ident: reader.get()?, }
    });

    Ok(quote! {
        const _: () = {
            fn load(
                reader: &mut ::mavnode::protocol::FieldReader<'_>,
            ) -> ::core::result::Result<
                ::std::boxed::Box<dyn ::mavnode::protocol::Message>,
                ::mavnode::error::FrameError,
            > {
                ::core::result::Result::Ok(::std::boxed::Box::new(#ident {
                    #(#load_fields)*
                }))
            }

            static SPEC: ::mavnode::protocol::MessageSpec = ::mavnode::protocol::MessageSpec {
                id: #message_id,
                name: #message_name,
                fields: &[#(#field_specs),*],
                load,
            };

            impl #ident {
                /// Static message specification consumed by dialects.
                pub fn message_spec() -> &'static ::mavnode::protocol::MessageSpec {
                    &SPEC
                }
            }

            impl ::mavnode::protocol::Message for #ident {
                fn spec(&self) -> &'static ::mavnode::protocol::MessageSpec {
                    Self::message_spec()
                }

                fn store(&self, writer: &mut ::mavnode::protocol::FieldWriter<'_>) {
                    #(#store_fields)*
                }

                fn as_any(&self) -> &dyn ::core::any::Any {
                    self
                }

                fn clone_message(&self) -> ::std::boxed::Box<dyn ::mavnode::protocol::Message> {
                    ::std::boxed::Box::new(::core::clone::Clone::clone(self))
                }
            }
        };
    })
}

fn parse_field(field: &syn::Field) -> Result<MessageField> {
    let ident = field
        .ident
        .clone()
        .ok_or_else(|| Error::new(field.span(), "tuple fields are not supported"))?;

    let wire_name = match find_str_attr(&field.attrs, "field_name")? {
        Some(name) => name,
        None => default_wire_name(&ident.to_string()),
    };

    let extension = has_attr(&field.attrs, "extension");
    let base_type = find_ident_attr(&field.attrs, "base_type")?;
    let string_len = find_int_attr(&field.attrs, "string_len")?;

    let (kind, array_len, array) = match &field.ty {
        Type::Array(array_ty) => {
            let len = parse_array_len(&array_ty.len)?;
            let kind = element_kind(&array_ty.elem, base_type.as_ref())?;
            (kind, len, true)
        }
        ty => {
            let last = type_ident(ty)?;
            if last == "String" {
                let len = string_len.ok_or_else(|| {
                    Error::new(ty.span(), "String fields require #[string_len(N)]")
                })?;
                (format_kind("char", ty.span())?, len, true)
            } else {
                (element_kind(ty, base_type.as_ref())?, 1, false)
            }
        }
    };

    Ok(MessageField {
        ident,
        wire_name,
        kind,
        array_len,
        array,
        extension,
    })
}

fn element_kind(ty: &Type, base_type: Option<&Ident>) -> Result<Ident> {
    let last = type_ident(ty)?;
    if is_primitive(&last) {
        format_kind(&last, ty.span())
    } else if let Some(base) = base_type {
        if !is_primitive(&base.to_string()) {
            return Err(Error::new(
                base.span(),
                "base_type must be one of: u8, i8, u16, i16, u32, i32, u64, i64",
            ));
        }
        format_kind(&base.to_string(), base.span())
    } else {
        Err(Error::new(
            ty.span(),
            format!("unsupported field type `{last}`; enums require #[base_type(...)]"),
        ))
    }
}

fn is_primitive(name: &str) -> bool {
    matches!(
        name,
        "u8" | "i8" | "u16" | "i16" | "u32" | "i32" | "u64" | "i64" | "f32" | "f64"
    )
}

fn format_kind(name: &str, span: proc_macro2::Span) -> Result<Ident> {
    let kind = match name {
        "u8" => "U8",
        "i8" => "I8",
        "u16" => "U16",
        "i16" => "I16",
        "u32" => "U32",
        "i32" => "I32",
        "u64" => "U64",
        "i64" => "I64",
        "f32" => "F32",
        "f64" => "F64",
        "char" => "Char",
        other => return Err(Error::new(span, format!("unsupported primitive `{other}`"))),
    };
    Ok(Ident::new(kind, span))
}

fn type_ident(ty: &Type) -> Result<String> {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string())
            .ok_or_else(|| Error::new(ty.span(), "unsupported field type")),
        _ => Err(Error::new(ty.span(), "unsupported field type")),
    }
}

fn parse_array_len(len: &Expr) -> Result<usize> {
    match len {
        Expr::Lit(lit) => match &lit.lit {
            Lit::Int(value) => value.base10_parse(),
            _ => Err(Error::new(len.span(), "array length must be an integer literal")),
        },
        _ => Err(Error::new(len.span(), "array length must be an integer literal")),
    }
}

fn parse_message_id(attrs: &[Attribute], span: proc_macro2::Span) -> Result<u32> {
    for attr in attrs {
        if attr.path().is_ident("message_id") {
            return attr.parse_args::<LitInt>()?.base10_parse();
        }
    }
    Err(Error::new(span, "missing #[message_id(...)] attribute"))
}

fn find_str_attr(attrs: &[Attribute], name: &str) -> Result<Option<String>> {
    for attr in attrs {
        if attr.path().is_ident(name) {
            return Ok(Some(attr.parse_args::<LitStr>()?.value()));
        }
    }
    Ok(None)
}

fn find_int_attr(attrs: &[Attribute], name: &str) -> Result<Option<usize>> {
    for attr in attrs {
        if attr.path().is_ident(name) {
            return Ok(Some(attr.parse_args::<LitInt>()?.base10_parse()?));
        }
    }
    Ok(None)
}

fn find_ident_attr(attrs: &[Attribute], name: &str) -> Result<Option<Ident>> {
    for attr in attrs {
        if attr.path().is_ident(name) {
            return Ok(Some(attr.parse_args::<Ident>()?));
        }
    }
    Ok(None)
}

fn has_attr(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}

/// Default wire name of a field: the identifier with the raw prefix and a
/// single trailing underscore stripped (`type_` → `type`).
fn default_wire_name(ident: &str) -> String {
    let ident = ident.strip_prefix("r#").unwrap_or(ident);
    ident.strip_suffix('_').unwrap_or(ident).to_string()
}

/// `CamelCase` → `UPPER_SNAKE_CASE`, keeping runs of capitals together
/// (`ServoOutputRaw` → `SERVO_OUTPUT_RAW`, `GPSStatus` → `GPS_STATUS`).
fn camel_to_upper_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_ascii_uppercase() && i > 0 {
            let prev_lower = chars[i - 1].is_ascii_lowercase() || chars[i - 1].is_ascii_digit();
            let next_lower = chars.get(i + 1).map(|c| c.is_ascii_lowercase()).unwrap_or(false);
            if prev_lower || (chars[i - 1].is_ascii_uppercase() && next_lower) {
                out.push('_');
            }
        }
        out.push(ch.to_ascii_uppercase());
    }

    out
}

///////////////////////////////////////////////////////////////////////////////
//                                   ENUM                                    //
///////////////////////////////////////////////////////////////////////////////

fn expand_enum(input: &DeriveInput) -> Result<TokenStream2> {
    let ident = &input.ident;
    let name = ident.to_string();

    let variants = match &input.data {
        Data::Enum(data) => &data.variants,
        _ => return Err(Error::new(input.span(), "Enum can be derived only for enums")),
    };

    for variant in variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(Error::new(variant.span(), "Enum variants must be fieldless"));
        }
    }

    let repr = parse_repr(&input.attrs, input.span())?;

    let match_arms = variants.iter().map(|variant| {
        let var = &variant.ident;
        quote! {
            if value == #ident::#var as #repr {
                return ::core::result::Result::Ok(#ident::#var);
            }
        }
    });

    Ok(quote! {
        impl ::mavnode::protocol::FieldValue for #ident {
            fn write_le(&self, buf: &mut [u8]) {
                ::mavnode::protocol::FieldValue::write_le(&(*self as #repr), buf);
            }

            fn read_le(buf: &[u8]) -> ::core::result::Result<Self, ::mavnode::error::FrameError> {
                let value = <#repr as ::mavnode::protocol::FieldValue>::read_le(buf)?;
                #(#match_arms)*
                ::core::result::Result::Err(::mavnode::error::FrameError::InvalidEnum {
                    enum_name: #name,
                    value: value as u64,
                })
            }
        }
    })
}

fn parse_repr(attrs: &[Attribute], span: proc_macro2::Span) -> Result<Ident> {
    for attr in attrs {
        if attr.path().is_ident("repr") {
            let repr = attr.parse_args::<Ident>()?;
            if !is_primitive(&repr.to_string()) {
                return Err(Error::new(
                    repr.span(),
                    "Enum repr must be an integer primitive (u8, u16, u32, u64, ...)",
                ));
            }
            return Ok(repr);
        }
    }
    Err(Error::new(span, "Enum requires an explicit #[repr(...)] attribute"))
}
