use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one and inject a freshly
/// loaded app over an in-memory store seeded with the example catalog.
///
/// Injectable dependencies are [`crate::App`],
/// [`crate::model::storage::MemoryStore`] (the app's backing store) and
/// [`crate::model::catalog::Catalog`]. With `#[app_test(signed_in)]` the
/// example user is logged in and has passcode `1234`.
#[proc_macro_attribute]
pub fn app_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract the arguments to inject and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Sign the example user in if needed.
    let maybe_sign_in = match parse_macro_input!(args as Option<Ident>) {
        Some(arg) if arg == "signed_in" => quote! {
            assert!(app.login("a.a@gmail.com", "password123").await);
            assert!(app.set_passcode(&"1234".parse().unwrap()).await);
        },
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected no argument or `signed_in`")
                .into_compile_error()
                .into();
        }
        None => TokenStream2::new(),
    };

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn setup() -> (
                crate::App,
                crate::model::storage::MemoryStore,
                crate::model::catalog::Catalog,
            ) {
                log4rs_test_utils::test_logging::init_logging_once_for(["civic_core"], None, None);

                let store = crate::model::storage::MemoryStore::new();
                let seed = crate::model::catalog::Seed::example();
                let catalog = seed.catalog.clone();
                let app = crate::App::with_store(
                    std::sync::Arc::new(store.clone()),
                    seed,
                    crate::model::secret::PasscodeHashing::Plaintext,
                    None,
                )
                .unwrap();
                app.load().await;

                #maybe_sign_in

                (app, store, catalog)
            }

            /// The test itself.
            #item_fn

            let runtime = tokio::runtime::Builder::new_current_thread()
                .thread_name("app-test")
                .enable_all()
                .build()
                .unwrap();

            #[allow(unused_variables)]
            let (app, store, catalog) = runtime.block_on(setup());
            runtime.block_on(#new_name(#(#test_args),*));
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut args = vec![];
    let mut seen = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let Pat::Ident(_) = &*pat_type.pat {
                if let Type::Path(type_path) = &*pat_type.ty {
                    if let Some(type_ident) = type_path.path.segments.last().map(|s| &s.ident) {
                        let arg = if type_ident == "App" {
                            Some(quote! { app })
                        } else if type_ident == "MemoryStore" {
                            Some(quote! { store })
                        } else if type_ident == "Catalog" {
                            Some(quote! { catalog })
                        } else {
                            None
                        };
                        if let Some(arg) = arg {
                            if seen.contains(type_ident) {
                                return Err(syn::Error::new(
                                    input.span(),
                                    format!("Test cannot accept more than one `{type_ident}`"),
                                ));
                            }
                            seen.push(type_ident.clone());
                            args.push(arg);
                            continue;
                        }
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `app: App`, `store: MemoryStore` or `catalog: Catalog`",
        ));
    }

    Ok(args)
}
