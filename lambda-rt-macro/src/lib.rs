//! Procedural macros for the lambda-rt function runtime.
//!
//! This crate provides the `#[lambda_function]` attribute macro, which turns
//! an async handler into the process entry point.
//!
//! # Example
//!
//! ```ignore
//! use lambda_rt::Context;
//!
//! #[lambda_rt::lambda_function(escape_html = false)]
//! async fn handle(ctx: Context, name: String) -> Result<String, std::convert::Infallible> {
//!     Ok(format!("Hello, {name}!"))
//! }
//! ```

use proc_macro::TokenStream;
use quote::quote;
use syn::{
    parse_macro_input, punctuated::Punctuated, Expr, ExprLit, FnArg, ItemFn, Lit, Meta, Token,
    Type,
};

/// Attributes for the `#[lambda_function]` macro.
#[derive(Default, Debug)]
struct LambdaFunctionAttrs {
    /// Escape HTML characters in JSON output.
    escape_html: Option<bool>,
    /// Pretty-print indent.
    indent: Option<String>,
    /// Pretty-print line prefix.
    prefix: Option<String>,
    /// Number of concurrent invocation loops.
    concurrency: Option<usize>,
    /// Register for SIGTERM before serving.
    sigterm: Option<bool>,
    /// Reject payload fields the input type does not declare.
    disallow_unknown_fields: Option<bool>,
    /// Keep exact number text in untyped values.
    use_number: Option<bool>,
}

impl LambdaFunctionAttrs {
    fn parse_meta_list(metas: Punctuated<Meta, Token![,]>) -> syn::Result<Self> {
        let mut attrs = LambdaFunctionAttrs::default();

        for meta in metas {
            let nv = match meta {
                Meta::NameValue(nv) => nv,
                other => return Err(syn::Error::new_spanned(other, "expected name = value")),
            };
            let ident = nv
                .path
                .get_ident()
                .ok_or_else(|| syn::Error::new_spanned(&nv.path, "expected identifier"))?
                .to_string();
            let lit = match &nv.value {
                Expr::Lit(ExprLit { lit, .. }) => lit.clone(),
                _ => return Err(syn::Error::new_spanned(&nv.value, "expected literal")),
            };

            match (ident.as_str(), lit) {
                ("escape_html", Lit::Bool(b)) => attrs.escape_html = Some(b.value),
                ("sigterm", Lit::Bool(b)) => attrs.sigterm = Some(b.value),
                ("disallow_unknown_fields", Lit::Bool(b)) => {
                    attrs.disallow_unknown_fields = Some(b.value)
                }
                ("use_number", Lit::Bool(b)) => attrs.use_number = Some(b.value),
                ("indent", Lit::Str(s)) => attrs.indent = Some(s.value()),
                ("prefix", Lit::Str(s)) => attrs.prefix = Some(s.value()),
                ("concurrency", Lit::Int(i)) => attrs.concurrency = Some(i.base10_parse()?),
                (
                    "escape_html" | "sigterm" | "indent" | "prefix" | "concurrency"
                    | "disallow_unknown_fields" | "use_number",
                    lit,
                ) => {
                    return Err(syn::Error::new_spanned(
                        lit,
                        format!("unexpected literal type for {ident}"),
                    ));
                }
                _ => {
                    return Err(syn::Error::new_spanned(
                        nv.path,
                        format!("unknown attribute: {}", ident),
                    ));
                }
            }
        }

        Ok(attrs)
    }
}

/// Turn an async handler into `fn main`.
///
/// The handler may take `()`, `(Context)`, `(TIn)` or `(Context, TIn)`. The
/// generated `main` installs a `tracing` subscriber filtered by `RUST_LOG`
/// (default `info`), builds a multi-threaded tokio runtime and calls
/// `lambda_rt::start_with_options`.
///
/// # Attributes
///
/// - `escape_html` (optional): escape `<`, `>` and `&` in JSON output (default: true)
/// - `indent` / `prefix` (optional): pretty-print JSON output
/// - `concurrency` (optional): number of concurrent invocation loops
/// - `sigterm` (optional): register for SIGTERM before serving
/// - `disallow_unknown_fields` (optional): reject payload fields the input type lacks
/// - `use_number` (optional): keep exact number text; needs the `use-number` feature
#[proc_macro_attribute]
pub fn lambda_function(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args with Punctuated::<Meta, Token![,]>::parse_terminated);
    let input_fn = parse_macro_input!(input as ItemFn);

    match generate_main(args, input_fn) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn generate_main(
    args: Punctuated<Meta, Token![,]>,
    input_fn: ItemFn,
) -> syn::Result<proc_macro2::TokenStream> {
    let attrs = LambdaFunctionAttrs::parse_meta_list(args)?;

    if input_fn.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            &input_fn.sig,
            "lambda_function must be async",
        ));
    }
    if input_fn.sig.ident == "main" {
        return Err(syn::Error::new_spanned(
            &input_fn.sig.ident,
            "lambda_function generates main; rename the handler",
        ));
    }

    let fn_name = &input_fn.sig.ident;
    let args: Vec<&FnArg> = input_fn.sig.inputs.iter().collect();
    let adapter = match args.as_slice() {
        [] => quote! { ::lambda_rt::unit_fn },
        [arg] if is_context(arg) => quote! { ::lambda_rt::context_fn },
        [_] => quote! { ::lambda_rt::input_fn },
        [_, _] => quote! { ::lambda_rt::handler_fn },
        _ => {
            return Err(syn::Error::new_spanned(
                &input_fn.sig.inputs,
                "lambda_function takes at most (Context, input)",
            ));
        }
    };

    let mut options = quote! { ::lambda_rt::HandlerOptions::new() };
    if let Some(escape_html) = attrs.escape_html {
        options = quote! { #options.escape_html(#escape_html) };
    }
    if attrs.indent.is_some() || attrs.prefix.is_some() {
        let prefix = attrs.prefix.unwrap_or_default();
        let indent = attrs.indent.unwrap_or_default();
        options = quote! { #options.indent(#prefix, #indent) };
    }
    if let Some(disallow) = attrs.disallow_unknown_fields {
        options = quote! { #options.disallow_unknown_fields(#disallow) };
    }
    if let Some(use_number) = attrs.use_number {
        options = quote! { #options.use_number(#use_number) };
    }
    if let Some(concurrency) = attrs.concurrency {
        options = quote! { #options.concurrency(#concurrency) };
    }
    if attrs.sigterm == Some(true) {
        options = quote! { #options.enable_sigterm() };
    }

    let expanded = quote! {
        #input_fn

        fn main() {
            ::lambda_rt::logging::init();
            let runtime = match ::lambda_rt::__private::tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    ::lambda_rt::__private::tracing::error!(
                        "failed to build tokio runtime: {}",
                        err
                    );
                    ::std::process::exit(1);
                }
            };
            runtime.block_on(::lambda_rt::start_with_options(#adapter(#fn_name), #options));
        }
    };

    Ok(expanded)
}

/// Whether a single argument is the runtime `Context`.
fn is_context(arg: &FnArg) -> bool {
    let FnArg::Typed(pat_type) = arg else {
        return false;
    };
    match pat_type.ty.as_ref() {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Context"),
        _ => false,
    }
}
