//! Macros for use with coterie
use proc_macro2::{Span, TokenStream};
use quote::{ToTokens, quote, quote_spanned};

use crate::parse::*;

/// For quickstart on how this works, let's analyze this example:
///
/// ```rust,no_run
/// #[coterie::main]
/// async fn main() {
///     println!("Hello world");
/// }
/// ```
///
/// The compiler splits the tokens where `args` is everything between the
/// proc_macro parentheses, which for coterie must be empty, since the
/// runtime has a single flavor and nothing to configure.
///
/// And `item` is the future that is to be driven by the runtime:
/// ```no_compile
/// async fn main() {
///     println!("Hello world");
/// }
/// ```
pub(crate) fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    // If any of the steps for this macro fail, we still want to expand to an
    // item that is as close to the expected output as possible. This helps
    // out IDEs such that completions and other related features keep working.
    let input: ItemFn = match syn::parse2(item.clone()) {
        Ok(it) => it,
        Err(e) => return token_stream_with_error(item, e),
    };

    let checked = if input.sig.ident == "main" && !input.sig.inputs.is_empty() {
        let msg = "the main function cannot accept arguments";
        Err(syn::Error::new_spanned(&input.sig.ident, msg))
    } else {
        check_signature(&input, args, false)
    };

    match checked {
        Ok(()) => expand(input, false),
        Err(e) => token_stream_with_error(expand(input, false), e),
    }
}

pub(crate) fn test(args: TokenStream, item: TokenStream) -> TokenStream {
    // If any of the steps for this macro fail, we still want to expand to an
    // item that is as close to the expected output as possible. This helps
    // out IDEs such that completions and other related features keep working.
    let input: ItemFn = match syn::parse2(item.clone()) {
        Ok(it) => it,
        Err(e) => return token_stream_with_error(item, e),
    };

    let checked = if let Some(attr) = input.attrs().find(|attr| is_test_attribute(attr)) {
        let msg = "second test attribute is supplied, consider removing or changing the order of your test attributes";
        Err(syn::Error::new_spanned(attr, msg))
    } else {
        check_signature(&input, args, true)
    };

    match checked {
        Ok(()) => expand(input, true),
        Err(e) => token_stream_with_error(expand(input, true), e),
    }
}

fn check_signature(input: &ItemFn, args: TokenStream, is_test: bool) -> Result<(), syn::Error> {
    if input.sig.asyncness.is_none() {
        let msg = "the `async` keyword is missing from the function declaration";
        return Err(syn::Error::new_spanned(input.sig.fn_token, msg));
    }

    if !args.is_empty() {
        let macro_name = if is_test { "coterie::test" } else { "coterie::main" };
        let msg = format!(
            "#[{macro_name}] takes no arguments; the runtime has a single single-threaded flavor"
        );
        return Err(syn::Error::new_spanned(args, msg));
    }

    Ok(())
}

fn expand(mut input: ItemFn, is_test: bool) -> TokenStream {
    input.sig.asyncness = None;

    // If type mismatch occurs, the current rustc points to the last statement.
    let (last_stmt_start_span, last_stmt_end_span) = {
        let mut last_stmt = input.stmts.last().cloned().unwrap_or_default().into_iter();

        // `Span` on stable Rust has a limitation that only points to the first
        // token, not the whole tokens. We can work around this limitation by
        // using the first/last span of the tokens like
        // `syn::Error::new_spanned` does.
        let start = last_stmt.next().map_or_else(Span::call_site, |t| t.span());
        let end = last_stmt.last().map_or(start, |t| t.span());
        (start, end)
    };

    let block_on = quote_spanned! {last_stmt_start_span=>
        coterie::block_on
    };

    let generated_attrs = if is_test {
        quote! {
            #[::core::prelude::v1::test]
        }
    } else {
        quote! {}
    };

    // This explicit `return` is intentional: it keeps the expansion working
    // for functions whose body ends in an expression of the return type.
    let last_block = quote_spanned! {last_stmt_end_span=>
        {
            return #block_on(body);
        }
    };

    let body = input.body();

    // For test functions pin the body to the stack and use `Pin<&mut dyn
    // Future>` to reduce the amount of `block_on` copies we generate during
    // compilation due to the generic parameter `F` (the future to run). This
    // could have an impact on performance, but because it's only for testing
    // it's unlikely to be very large.
    //
    // We don't do this for the main function as it should only be used once
    // so there will be no benefit.
    let body = if is_test {
        let output_type = match &input.sig.output {
            // For functions with no return value syn doesn't print anything,
            // but that doesn't work as `Output` for our boxed `Future`, so
            // default to `()` (the same type as the function output).
            syn::ReturnType::Default => quote! { () },
            syn::ReturnType::Type(_, ret_type) => ret_type.to_token_stream(),
        };
        quote! {
            let unpinned = async #body;
            let pinned = std::pin::pin!(unpinned);
            let body: ::core::pin::Pin<&mut dyn ::core::future::Future<Output = #output_type>> = pinned;
        }
    } else {
        quote! {
            let body = async #body;
        }
    };

    input.into_tokens(generated_attrs, body, last_block)
}
