use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Ident, ItemFn, LitStr, Token,
    parse::{Parse, ParseStream},
    parse_macro_input,
    punctuated::Punctuated,
};

/// Check one connection string at compile time.
///
/// Expands to the string literal itself, or to a compile error carrying the
/// parse failure.
///
/// ```rust,ignore
/// let conn = quiver::connection!("sub.items*.value:label");
/// ```
#[proc_macro]
pub fn connection(input: TokenStream) -> TokenStream {
    let lit = parse_macro_input!(input as LitStr);
    if let Err(err) = check_connections(std::slice::from_ref(&lit)) {
        return err.to_compile_error().into();
    }
    TokenStream::from(quote! { #lit })
}

/// Check connection strings at compile time.
///
/// Expands to an array of the given string literals. A malformed string is
/// reported as a compile error on that literal.
///
/// ```rust,ignore
/// let conns = quiver::connections!["value", "!children*.clicked:log"];
/// ```
#[proc_macro]
pub fn connections(input: TokenStream) -> TokenStream {
    let list = parse_macro_input!(input with Punctuated::<LitStr, Token![,]>::parse_terminated);
    let literals: Vec<LitStr> = list.into_iter().collect();
    if let Err(err) = check_connections(&literals) {
        return err.to_compile_error().into();
    }
    TokenStream::from(quote! { [#(#literals),*] })
}

/// Turn a function into a reaction declaration.
///
/// The function keeps its body but is replaced by a constructor of the
/// same name returning a `quiver::ReactionDescriptor`. Connection strings
/// are checked at compile time.
///
/// ```rust,ignore
/// #[quiver::reaction("value", "!reset")]
/// fn track(c: &Component, events: &[Event]) {
///     println!("{} events", events.len());
/// }
///
/// let class = ComponentClass::builder("Tracked").reaction(track()).build()?;
/// ```
#[proc_macro_attribute]
pub fn reaction(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as ReactionArgs);
    let input = parse_macro_input!(item as ItemFn);

    if args.connections.is_empty() {
        return syn::Error::new_spanned(
            &input.sig.ident,
            "a reaction needs one or more connection strings",
        )
        .to_compile_error()
        .into();
    }
    if let Err(err) = check_connections(&args.connections) {
        return err.to_compile_error().into();
    }

    let connections = &args.connections;
    let member = Member::new(&input, args.name);
    let (vis, attrs, name, literal, inner) = member.parts();
    let expanded = quote! {
        #(#attrs)*
        #[allow(non_snake_case)]
        #vis fn #name() -> ::quiver::ReactionDescriptor {
            #inner
            ::quiver::ReactionDescriptor::new(#literal, &[#(#connections),*], __body)
        }
    };
    TokenStream::from(expanded)
}

/// Turn a function into an action declaration.
///
/// The function must take `(&Component, &[Value])`; it is replaced by a
/// constructor of the same name returning a `quiver::ActionDescriptor`.
#[proc_macro_attribute]
pub fn action(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as MemberArgs);
    let input = parse_macro_input!(item as ItemFn);
    expand_member(&input, args.name, quote! { ::quiver::ActionDescriptor })
}

/// Turn a function into an emitter declaration.
///
/// The function must take `(&Component, &[Value])` and return a payload;
/// it is replaced by a constructor of the same name returning a
/// `quiver::EmitterDescriptor`.
#[proc_macro_attribute]
pub fn emitter(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as MemberArgs);
    let input = parse_macro_input!(item as ItemFn);
    expand_member(&input, args.name, quote! { ::quiver::EmitterDescriptor })
}

fn expand_member(
    input: &ItemFn,
    name: Option<LitStr>,
    descriptor: proc_macro2::TokenStream,
) -> TokenStream {
    if input.sig.inputs.len() != 2 {
        return syn::Error::new_spanned(
            &input.sig.inputs,
            "member functions take `(component: &Component, args: &[Value])`",
        )
        .to_compile_error()
        .into();
    }
    let member = Member::new(input, name);
    let (vis, attrs, fn_name, literal, inner) = member.parts();
    let expanded = quote! {
        #(#attrs)*
        #[allow(non_snake_case)]
        #vis fn #fn_name() -> #descriptor {
            #inner
            #descriptor::new(#literal, __body)
        }
    };
    TokenStream::from(expanded)
}

fn check_connections(literals: &[LitStr]) -> syn::Result<()> {
    for lit in literals {
        if let Err(err) = quiver_core::Connection::parse(&lit.value()) {
            return Err(syn::Error::new(lit.span(), err.to_string()));
        }
    }
    Ok(())
}

/// A member function split into the pieces the expansions need.
struct Member<'a> {
    input: &'a ItemFn,
    name: LitStr,
}

impl<'a> Member<'a> {
    fn new(input: &'a ItemFn, name: Option<LitStr>) -> Self {
        let ident = &input.sig.ident;
        let name = name.unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));
        Self { input, name }
    }

    fn parts(
        &self,
    ) -> (
        &syn::Visibility,
        &[syn::Attribute],
        &Ident,
        &LitStr,
        proc_macro2::TokenStream,
    ) {
        let sig = &self.input.sig;
        let inputs = &sig.inputs;
        let output = &sig.output;
        let generics = &sig.generics;
        let block = &self.input.block;
        let inner = quote! {
            fn __body #generics (#inputs) #output #block
        };
        (&self.input.vis, &self.input.attrs, &sig.ident, &self.name, inner)
    }
}

/// `#[reaction("conn", ..., name = "label")]`
struct ReactionArgs {
    connections: Vec<LitStr>,
    name: Option<LitStr>,
}

impl Parse for ReactionArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut connections = Vec::new();
        let mut name = None;

        while !input.is_empty() {
            if input.peek(LitStr) {
                connections.push(input.parse()?);
            } else {
                let ident: Ident = input.parse()?;
                input.parse::<Token![=]>()?;
                match ident.to_string().as_str() {
                    "name" => name = Some(input.parse()?),
                    other => {
                        return Err(syn::Error::new(
                            ident.span(),
                            format!("unknown attribute: {}", other),
                        ));
                    }
                }
            }

            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(ReactionArgs { connections, name })
    }
}

/// `#[action]`, `#[action(name = "...")]`
struct MemberArgs {
    name: Option<LitStr>,
}

impl Parse for MemberArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut name = None;

        while !input.is_empty() {
            let ident: Ident = input.parse()?;
            input.parse::<Token![=]>()?;
            match ident.to_string().as_str() {
                "name" => name = Some(input.parse()?),
                other => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("unknown attribute: {}", other),
                    ));
                }
            }

            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(MemberArgs { name })
    }
}
