//! Collection and classification of instrumentable declarations.
//!
//! Walks a parsed file's top-level items, turns every declaration that can
//! safely carry a redirect into a [`FnTarget`] (everything the code
//! generator needs), and records why the rest were left alone.

use ra_ap_syntax::ast::{self, HasGenericParams, HasModuleItem, HasName};
use ra_ap_syntax::{AstNode, SourceFile, SyntaxKind, TextRange, TextSize};

/// One declaration the engine will instrument.
#[derive(Debug, Clone)]
pub struct FnTarget {
    /// Function or method name.
    pub name: String,
    /// Impl type text for methods (`File` in `impl File { .. }`); `None`
    /// for free functions.
    pub self_ty: Option<String>,
    /// Parameter names in declaration order, receiver first.
    pub arg_names: Vec<String>,
    /// Parameter type texts matching `arg_names`; the receiver is rendered
    /// as `&T` / `&mut T` / `T` and `Self` is replaced by the impl type.
    pub param_types: Vec<String>,
    /// Return type text, if the declaration has one.
    pub ret_ty: Option<String>,
    /// Offset just past the body's `{`, where the guard is spliced.
    pub body_insert_at: TextSize,
    /// Body span, hashed for the guard flag name.
    pub body_range: TextRange,
    /// Leading whitespace of the line the declaration starts on.
    pub indent: String,
}

impl FnTarget {
    /// Expression naming the function as a value: `name` or `<T>::name`.
    pub fn ident_expr(&self) -> String {
        match &self.self_ty {
            Some(ty) => format!("<{}>::{}", ty, self.name),
            None => self.name.clone(),
        }
    }

    /// The declaration's fn-pointer type.
    pub fn fn_ptr_ty(&self) -> String {
        let params = self.param_types.join(", ");
        match &self.ret_ty {
            Some(ret) => format!("fn({}) -> {}", params, ret),
            None => format!("fn({})", params),
        }
    }
}

/// Why a declaration stays uninstrumented.
///
/// Not an error: the declaration simply remains unmockable, which is a
/// per-declaration trade-off rather than a failure of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No body to redirect (extern declaration, trait prototype).
    NoBody,
    /// Generic parameters or a `where` clause: no single entry point to
    /// take the address of.
    Generic,
    /// `async fn` has no writable fn-pointer type.
    Async,
    /// Injected registry calls cannot appear in a `const fn` body.
    Const,
    /// Calling the fetched fn pointer would need an `unsafe` block.
    Unsafe,
    /// Explicit ABI; the synthesized cast assumes the Rust ABI.
    ExternAbi,
    /// C-variadic parameter: `...` cannot be forwarded through a
    /// fn-pointer call.
    Variadic,
    /// A parameter pattern with no plain name to forward.
    UnnamedParam,
    /// Receiver other than `self`, `&self` or `&mut self`.
    ReceiverShape,
    /// `impl Trait` in the signature has no fn-pointer form.
    ImplTraitSignature,
    /// Method of a trait impl or of a non-path impl type; its identity is
    /// not expressible as `<T>::name`.
    TraitImpl,
    /// A type identifier in the signature is also a parameter name
    /// elsewhere in it, making the rewritten signature ambiguous to read.
    TypeNameClash,
}

/// Outcome of scanning one file.
#[derive(Debug, Default)]
pub struct Collected {
    /// Declarations the engine will instrument.
    pub targets: Vec<FnTarget>,
    /// Declarations left alone, with the reason each was skipped.
    pub skipped: Vec<(String, SkipReason)>,
}

/// Scan the top-level items of `file`.
///
/// Only top-level `fn` items and methods of top-level inherent `impl`
/// blocks are candidates; items nested in inline modules are out of reach
/// of the generated file-scope statics and are ignored.
pub fn collect_targets(source: &str, file: &SourceFile) -> Collected {
    let mut out = Collected::default();

    for item in file.items() {
        match item {
            ast::Item::Fn(func) => consider(source, &func, None, &mut out),
            ast::Item::Impl(imp) => collect_impl(source, &imp, &mut out),
            _ => {}
        }
    }

    out
}

fn collect_impl(source: &str, imp: &ast::Impl, out: &mut Collected) {
    let blanket_reason = if imp.trait_().is_some() {
        Some(SkipReason::TraitImpl)
    } else if imp.generic_param_list().is_some() || imp.where_clause().is_some() {
        Some(SkipReason::Generic)
    } else {
        None
    };

    let self_ty = imp.self_ty();
    let self_ty_text = match &self_ty {
        Some(ast::Type::PathType(path)) => Some(path.syntax().text().to_string()),
        _ => None,
    };

    let Some(items) = imp.assoc_item_list() else {
        return;
    };
    for item in items.assoc_items() {
        let ast::AssocItem::Fn(func) = item else {
            continue;
        };
        if let Some(reason) = blanket_reason {
            record_skip(&func, reason, out);
            continue;
        }
        match &self_ty_text {
            Some(ty) => consider(source, &func, Some(ty), out),
            // Inherent impl on a non-path type (references, tuples).
            None => record_skip(&func, SkipReason::TraitImpl, out),
        }
    }
}

fn consider(source: &str, func: &ast::Fn, self_ty: Option<&str>, out: &mut Collected) {
    match classify(source, func, self_ty) {
        Ok(target) => out.targets.push(target),
        Err(reason) => record_skip(func, reason, out),
    }
}

fn record_skip(func: &ast::Fn, reason: SkipReason, out: &mut Collected) {
    let name = func
        .name()
        .map(|n| n.text().to_string())
        .unwrap_or_else(|| "<unnamed>".to_owned());
    out.skipped.push((name, reason));
}

fn classify(source: &str, func: &ast::Fn, self_ty: Option<&str>) -> Result<FnTarget, SkipReason> {
    let body = func.body().ok_or(SkipReason::NoBody)?;
    let name = func.name().ok_or(SkipReason::UnnamedParam)?;

    if func.async_token().is_some() {
        return Err(SkipReason::Async);
    }
    if func.const_token().is_some() {
        return Err(SkipReason::Const);
    }
    if func.unsafe_token().is_some() {
        return Err(SkipReason::Unsafe);
    }
    if func.abi().is_some() {
        return Err(SkipReason::ExternAbi);
    }
    if func.generic_param_list().is_some() || func.where_clause().is_some() {
        return Err(SkipReason::Generic);
    }

    let mut arg_names = Vec::new();
    let mut param_types = Vec::new();
    let mut type_nodes = Vec::new();

    if let Some(params) = func.param_list() {
        if let Some(receiver) = params.self_param() {
            let impl_ty = self_ty.ok_or(SkipReason::ReceiverShape)?;
            param_types.push(receiver_type(&receiver, impl_ty)?);
            arg_names.push("self".to_owned());
        }

        for param in params.params() {
            if param.dotdotdot_token().is_some() {
                return Err(SkipReason::Variadic);
            }
            let pat = param.pat().ok_or(SkipReason::UnnamedParam)?;
            arg_names.push(binding_name(&pat).ok_or(SkipReason::UnnamedParam)?);
            let ty = param.ty().ok_or(SkipReason::UnnamedParam)?;
            param_types.push(render_type(&ty, self_ty));
            type_nodes.push(ty);
        }
    }

    let ret_ty = func.ret_type().and_then(|r| r.ty()).map(|ty| {
        let text = render_type(&ty, self_ty);
        type_nodes.push(ty);
        text
    });

    for ty in &type_nodes {
        if contains_impl_trait(ty) {
            return Err(SkipReason::ImplTraitSignature);
        }
    }
    if types_clash_with_arg_names(&type_nodes, &arg_names) {
        return Err(SkipReason::TypeNameClash);
    }

    let l_curly = body
        .stmt_list()
        .and_then(|list| list.l_curly_token())
        .ok_or(SkipReason::NoBody)?;

    Ok(FnTarget {
        name: name.text().to_string(),
        self_ty: self_ty.map(str::to_owned),
        arg_names,
        param_types,
        ret_ty,
        body_insert_at: l_curly.text_range().end(),
        body_range: body.syntax().text_range(),
        indent: line_indent(source, func.syntax().text_range().start().into()),
    })
}

/// Type the receiver contributes to the fn-pointer signature.
fn receiver_type(receiver: &ast::SelfParam, self_ty: &str) -> Result<String, SkipReason> {
    if receiver.ty().is_some() || receiver.lifetime().is_some() {
        // `self: Arc<Self>` and friends, or an explicit receiver lifetime.
        return Err(SkipReason::ReceiverShape);
    }
    Ok(if receiver.amp_token().is_some() {
        if receiver.mut_token().is_some() {
            format!("&mut {}", self_ty)
        } else {
            format!("&{}", self_ty)
        }
    } else {
        self_ty.to_owned()
    })
}

/// The forwarded name of a parameter, if its pattern is a plain binding.
///
/// `ref` bindings and `@` subpatterns change what the name denotes, so only
/// bare (possibly `mut`) identifier patterns qualify.
fn binding_name(pat: &ast::Pat) -> Option<String> {
    match pat {
        ast::Pat::IdentPat(ident) if ident.ref_token().is_none() && ident.pat().is_none() => {
            ident.name().map(|n| n.text().to_string())
        }
        _ => None,
    }
}

/// Render a type's source text, substituting `Self` with the impl type so
/// the result is valid at file scope.
fn render_type(ty: &ast::Type, self_ty: Option<&str>) -> String {
    let mut out = String::new();
    for element in ty.syntax().descendants_with_tokens() {
        let Some(token) = element.into_token() else {
            continue;
        };
        match self_ty {
            Some(substitute) if token.text() == "Self" => out.push_str(substitute),
            _ => out.push_str(token.text()),
        }
    }
    out
}

fn contains_impl_trait(ty: &ast::Type) -> bool {
    ty.syntax()
        .descendants()
        .any(|node| ast::ImplTraitType::can_cast(node.kind()))
}

/// Does any type path in the signature use an identifier that is also a
/// parameter name? `fn close(file: &file)` in a module that also defines a
/// type `file` is the classic case; skip rather than emit a signature a
/// reader cannot resolve at a glance.
fn types_clash_with_arg_names(types: &[ast::Type], arg_names: &[String]) -> bool {
    types.iter().any(|ty| {
        ty.syntax()
            .descendants_with_tokens()
            .filter_map(|element| element.into_token())
            .filter(|token| token.kind() == SyntaxKind::IDENT)
            .any(|token| arg_names.iter().any(|name| name == token.text()))
    })
}

/// Leading whitespace of the line containing `offset`.
fn line_indent(source: &str, offset: usize) -> String {
    let line_start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
    source[line_start..]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect()
}
