use proc_macro2::TokenStream;
use quote::{ToTokens, quote, quote_spanned};
use syn::meta::ParseNestedMeta;
use syn::parse::Parser;
use syn::spanned::Spanned;
use syn::{AttrStyle, ItemFn, LitStr, Path, ReturnType};

const KNOWN_ARGS: &str = "`tag`, `crate`";

/// Rewrites
///
/// ```ignore
/// #[handoff::task(tag = "load")]
/// async fn load(key: Key) -> anyhow::Result<Page> {
///     let bytes = handoff::awaiting(read(key)).await?;
///     Ok(Page::decode(bytes))
/// }
/// ```
///
/// into a plain function that spawns its body and returns the waiter:
///
/// ```ignore
/// #[track_caller]
/// fn load(key: Key) -> handoff::Waiter<<anyhow::Result<Page> as handoff::TaskOutput>::Value> {
///     let body = async move { /* original body */ };
///     handoff::spawn_builder().with_tag("load").spawn(body)
/// }
/// ```
pub(crate) fn task(args: TokenStream, item: TokenStream) -> TokenStream {
    let input: ItemFn = match syn::parse2(item.clone()) {
        Ok(input) => input,
        Err(err) => return with_error(item, err),
    };

    let mut opts = TaskArgs::default();
    let parsed = syn::meta::parser(|meta| opts.parse(meta))
        .parse2(args)
        .and_then(|()| check_signature(&input));

    // On error, still emit the rewritten function so that the caller's code
    // keeps type-checking against `Waiter` and only the macro error shows.
    match parsed {
        Ok(()) => expand(input, &opts),
        Err(err) => with_error(expand(input, &TaskArgs::default()), err),
    }
}

/// Arguments of `#[handoff::task(...)]`.
#[derive(Default)]
struct TaskArgs {
    tag: Option<LitStr>,
    krate: Option<Path>,
}

impl TaskArgs {
    fn parse(&mut self, meta: ParseNestedMeta<'_>) -> syn::Result<()> {
        if meta.path.is_ident("tag") {
            if self.tag.is_some() {
                return Err(meta.error("`tag` set multiple times"));
            }

            let tag: LitStr = meta.value()?.parse()?;
            if tag.value().is_empty() {
                return Err(syn::Error::new(tag.span(), "`tag` may not be empty"));
            }
            self.tag = Some(tag);
            Ok(())
        } else if meta.path.is_ident("crate") {
            if self.krate.is_some() {
                return Err(meta.error("`crate` set multiple times"));
            }

            let path: LitStr = meta.value()?.parse()?;
            self.krate = Some(path.parse()?);
            Ok(())
        } else {
            Err(meta.error(format!("unknown argument, expected one of: {KNOWN_ARGS}")))
        }
    }
}

fn check_signature(input: &ItemFn) -> syn::Result<()> {
    if input.sig.asyncness.is_none() {
        let msg = "the `async` keyword is missing from the function declaration";
        return Err(syn::Error::new_spanned(input.sig.fn_token, msg));
    }

    if let Some(receiver) = input.sig.receiver() {
        let msg = "tasks must own their state, methods taking `self` are not supported";
        return Err(syn::Error::new_spanned(receiver, msg));
    }

    Ok(())
}

fn with_error(mut tokens: TokenStream, err: syn::Error) -> TokenStream {
    tokens.extend(err.into_compile_error());
    tokens
}

fn expand(mut input: ItemFn, opts: &TaskArgs) -> TokenStream {
    let krate = opts
        .krate
        .clone()
        .unwrap_or_else(|| syn::parse_quote!(handoff));
    let tag = opts
        .tag
        .as_ref()
        .map_or_else(|| input.sig.ident.to_string(), LitStr::value);

    // `#![...]` cannot sit inside the async block, it moves onto the fn.
    for attr in &mut input.attrs {
        attr.style = AttrStyle::Outer;
    }
    input.attrs.push(syn::parse_quote!(#[track_caller]));

    let output = match &input.sig.output {
        ReturnType::Default => quote!(()),
        ReturnType::Type(_, ty) => ty.to_token_stream(),
    };

    input.sig.asyncness = None;
    input.sig.output = syn::parse_quote! {
        -> #krate::Waiter<<#output as #krate::TaskOutput>::Value>
    };

    // rustc reports a mismatched body type at its last statement.
    let last_span = input
        .block
        .stmts
        .last()
        .map_or_else(|| input.block.brace_token.span.close(), Spanned::span);

    let spawn = quote_spanned! {last_span=>
        #krate::spawn_builder().with_tag(#tag).spawn(body)
    };

    // The typed binding pins down what `?` converts into inside the body.
    let body = &input.block;
    let block: syn::Block = syn::parse_quote!({
        #[allow(unreachable_code)]
        let body = async move {
            let __handoff_output: #output = #body;
            __handoff_output
        };
        #spawn
    });

    *input.block = block;
    input.into_token_stream()
}
