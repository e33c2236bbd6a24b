#![allow(clippy::needless_doctest_main)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! Macros for use with coterie (adapted from tokio-macros)

mod entry;
mod parse;

/// Marks an async function to be executed by the coterie runtime. This macro
/// helps set up the runtime without requiring the user to call
/// [`block_on`] themselves.
///
/// The runtime has exactly one flavor (single-threaded cooperative), so the
/// macro takes no arguments.
///
/// # Non-worker async function
///
/// Note that the async function marked with this macro is not a task: it is
/// the root future driven by `block_on`. The expectation is that other tasks
/// are spawned by the function here.
///
/// # Function arguments
///
/// Function arguments are NOT allowed.
///
/// # Usage
///
/// ```no_run
/// #[coterie::main]
/// async fn main() {
///     println!("Hello world");
/// }
/// ```
///
/// Equivalent code not using `#[coterie::main]`
///
/// ```no_run
/// fn main() {
///     coterie::block_on(async {
///         println!("Hello world");
///     })
/// }
/// ```
///
/// [`block_on`]: ../coterie/fn.block_on.html
#[proc_macro_attribute]
pub fn main(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::main(args.into(), item.into()).into()
}

/// Marks an async function to be executed by the runtime, suitable to the
/// test environment. Each test gets a fresh root future on the thread's
/// runtime.
///
/// # Usage
///
/// ```no_run
/// #[coterie::test]
/// async fn my_test() {
///     assert!(true);
/// }
/// ```
///
/// Equivalent code not using `#[coterie::test]`
///
/// ```no_run
/// #[test]
/// fn my_test() {
///     coterie::block_on(async {
///         assert!(true);
///     })
/// }
/// ```
#[proc_macro_attribute]
pub fn test(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::test(args.into(), item.into()).into()
}
