// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Attribute macros expanding a CAN message set schema into Rust
//! decoders and encoders.

use canpack_compiler::layout::{OffsetMode, Options, OrderErrorPolicy};
use canpack_compiler::{analyzer, ast, backends, layout, parser};
use codespan_reporting::term;
use heck::ToUpperCamelCase;
use proc_macro2::{Span, TokenStream};
use quote::quote;
use std::env;
use std::path::Path;
use syn::parse::{Parse, ParseStream};
use syn::parse_macro_input;

/// Macro arguments: the schema literal followed by optional
/// `key = value` generation options.
struct Args {
    schema: syn::LitStr,
    name: Option<String>,
    can_id_offset: Option<u32>,
    dynamic_offset: bool,
    on_order_error: OrderErrorPolicy,
}

impl Parse for Args {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = Args {
            schema: input.parse()?,
            name: None,
            can_id_offset: None,
            dynamic_offset: false,
            on_order_error: OrderErrorPolicy::Drop,
        };
        while !input.is_empty() {
            input.parse::<syn::Token![,]>()?;
            if input.is_empty() {
                break;
            }
            let key: syn::Ident = input.parse()?;
            input.parse::<syn::Token![=]>()?;
            match key.to_string().as_str() {
                "name" => args.name = Some(input.parse::<syn::LitStr>()?.value()),
                "can_id_offset" => {
                    args.can_id_offset = Some(input.parse::<syn::LitInt>()?.base10_parse()?)
                }
                "dynamic_offset" => args.dynamic_offset = input.parse::<syn::LitBool>()?.value,
                "on_order_error" => {
                    let policy = input.parse::<syn::LitStr>()?;
                    args.on_order_error = match policy.value().as_str() {
                        "drop" => OrderErrorPolicy::Drop,
                        "resync" => OrderErrorPolicy::Resync,
                        _ => {
                            return Err(syn::Error::new(
                                policy.span(),
                                "expected \"drop\" or \"resync\"",
                            ))
                        }
                    }
                }
                _ => return Err(syn::Error::new(key.span(), format!("unknown option `{}`", key))),
            }
        }
        if args.dynamic_offset && args.can_id_offset.is_some() {
            return Err(syn::Error::new(
                args.schema.span(),
                "`can_id_offset` and `dynamic_offset` are exclusive",
            ));
        }
        Ok(args)
    }
}

impl Args {
    fn options(&self, default_name: &str) -> Options {
        Options {
            name: self.name.clone().unwrap_or_else(|| default_name.to_upper_camel_case()),
            offset: if self.dynamic_offset {
                OffsetMode::Dynamic
            } else {
                OffsetMode::Static(self.can_id_offset.unwrap_or(0))
            },
            on_order_error: self.on_order_error,
        }
    }
}

fn compile_error(span: Span, buffer: termcolor::Buffer) -> TokenStream {
    let message = String::from_utf8_lossy(&buffer.into_inner()).into_owned();
    syn::Error::new(span, message).to_compile_error()
}

/// Analyze a parsed schema and expand the generated code into `input`.
fn expand(
    span: Span,
    sources: &ast::SourceDatabase,
    file: Result<ast::File, codespan_reporting::diagnostic::Diagnostic<ast::FileId>>,
    options: &Options,
    source_name: &str,
    input: syn::ItemMod,
    include: Option<&str>,
) -> TokenStream {
    let file = match file {
        Ok(file) => file,
        Err(err) => {
            let mut buffer = termcolor::Buffer::no_color();
            if term::emit(&mut buffer, &term::Config::default(), sources, &err).is_err() {
                return syn::Error::new(span, err.message).to_compile_error();
            }
            return compile_error(span, buffer);
        }
    };

    // Warnings cannot be reported from a stable proc macro and are
    // dropped.
    let schema = match analyzer::analyze(&file, options) {
        Ok((schema, _)) => schema,
        Err(diagnostics) => {
            let mut buffer = termcolor::Buffer::no_color();
            if diagnostics.emit(sources, &mut buffer).is_err() {
                return syn::Error::new(span, "schema analysis failed").to_compile_error();
            }
            return compile_error(span, buffer);
        }
    };

    let layout = layout::generate(&schema, options);
    let generated = backends::rust::generate_tokens(&layout, source_name);
    // Generate an include_bytes! statement to force a dependency on
    // the schema file.
    let include = include.map(|path| quote!(const _: &[u8] = include_bytes!(#path);));
    let mod_ident = input.ident;
    let mod_attrs = input.attrs;
    let mod_vis = input.vis;
    let mod_items = input.content.map(|(_, items)| items).unwrap_or_default();

    quote! {
        #(#mod_attrs)*
        #mod_vis mod #mod_ident {
            #include
            #generated
            #(#mod_items)*
        }
    }
}

fn canpack_proc_macro(args: Args, input: syn::ItemMod) -> TokenStream {
    let path = &args.schema;
    // Locate the schema file.
    let root = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into());
    let Some(relative_path) =
        [Path::new(&root).join(path.value()), Path::new(&root).join("src").join(path.value())]
            .into_iter()
            .find(|path| path.exists())
    else {
        return syn::Error::new(path.span(), "error: unable to find file").to_compile_error();
    };
    let Some(relative_path) = relative_path.to_str().map(str::to_owned) else {
        return syn::Error::new(path.span(), "error: non UTF-8 file path").to_compile_error();
    };

    let stem = Path::new(&relative_path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("message_set")
        .to_owned();
    let source_name = Path::new(&relative_path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("message_set")
        .to_owned();
    let options = args.options(&stem);

    let mut sources = ast::SourceDatabase::new();
    let file = parser::parse_file(&mut sources, &relative_path);
    expand(path.span(), &sources, file, &options, &source_name, input, Some(&relative_path))
}

fn canpack_inline_proc_macro(args: Args, input: syn::ItemMod) -> TokenStream {
    let options = args.options(&input.ident.to_string());
    let source_name = format!("{}.toml", input.ident);
    let mut sources = ast::SourceDatabase::new();
    let file = parser::parse_inline(&mut sources, &source_name, args.schema.value());
    expand(args.schema.span(), &sources, file, &options, &source_name, input, None)
}

/// Expand the decoder and encoder of the schema file into the
/// annotated module.
///
/// The path is relative to the crate root or to its `src` directory.
/// Options: `name = "..."`, `can_id_offset = ...`,
/// `dynamic_offset = true`, `on_order_error = "drop" | "resync"`.
#[proc_macro_attribute]
pub fn canpack(
    attr: proc_macro::TokenStream,
    input: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let args = parse_macro_input!(attr as Args);
    let input = parse_macro_input!(input as syn::ItemMod);
    canpack_proc_macro(args, input).into()
}

/// Same as [`macro@canpack`], with the schema given inline.
#[proc_macro_attribute]
pub fn canpack_inline(
    attr: proc_macro::TokenStream,
    input: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let args = parse_macro_input!(attr as Args);
    let input = parse_macro_input!(input as syn::ItemMod);
    canpack_inline_proc_macro(args, input).into()
}
