//! Call-site analysis.
//!
//! Every function body is walked with a scope stack. A call whose callee
//! resolves to a marked function becomes a [`CallSite`]: accepted when each
//! argument is literal-only and the host issues a token, rejected with the
//! first offending name otherwise.

use std::collections::HashSet;

use ctfe_core::host::InterceptionHost;
use ctfe_core::model::{
    AnnotatedFunction, CallSite, CallSiteKind, CallSiteOutcome, FunctionId,
};
use proc_macro2::{TokenStream, TokenTree};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::visit::{self, Visit};
use syn::Token;

use crate::source::{ParsedCrate, ParsedUnit};
use crate::symbols::SymbolIndex;

pub struct CallSiteAnalyzer<'a> {
    index: &'a SymbolIndex,
    functions: HashSet<FunctionId>,
    host: &'a dyn InterceptionHost,
}

impl<'a> CallSiteAnalyzer<'a> {
    pub fn new(
        index: &'a SymbolIndex,
        functions: &[AnnotatedFunction],
        host: &'a dyn InterceptionHost,
    ) -> Self {
        Self {
            index,
            functions: functions.iter().map(|f| f.id.clone()).collect(),
            host,
        }
    }

    /// Analyse every unit in order. Returns `None` when `cancelled` reports
    /// true between units.
    pub fn analyze(
        &self,
        parsed: &ParsedCrate,
        cancelled: impl Fn() -> bool,
    ) -> Option<Vec<CallSiteOutcome>> {
        let mut outcomes = Vec::new();
        for unit in &parsed.units {
            if cancelled() {
                return None;
            }
            outcomes.extend(self.analyze_unit(unit));
        }
        Some(outcomes)
    }

    pub fn analyze_unit(&self, unit: &ParsedUnit) -> Vec<CallSiteOutcome> {
        if self.functions.is_empty() {
            return Vec::new();
        }
        let mut visitor = BodyVisitor {
            analyzer: self,
            unit,
            module: unit.unit.module_path.clone(),
            self_ty: Vec::new(),
            scopes: Vec::new(),
            macro_depth: 0,
            outcomes: Vec::new(),
        };
        visitor.visit_file(&unit.file);
        visitor.outcomes
    }
}

struct BodyVisitor<'v, 'a> {
    analyzer: &'v CallSiteAnalyzer<'a>,
    unit: &'v ParsedUnit,
    module: Vec<String>,
    self_ty: Vec<Option<Vec<String>>>,
    /// Local bindings, innermost scope last.
    scopes: Vec<HashSet<String>>,
    macro_depth: usize,
    outcomes: Vec<CallSiteOutcome>,
}

impl BodyVisitor<'_, '_> {
    fn current_self_ty(&self) -> Option<&[String]> {
        self.self_ty.last().and_then(|ty| ty.as_deref())
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn bind(&mut self, pat: &syn::Pat) {
        let mut names = Vec::new();
        bindings(pat, &mut names);
        if self.scopes.is_empty() {
            self.scopes.push(HashSet::new());
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.extend(names);
        }
    }

    fn with_scope(&mut self, pats: &[&syn::Pat], body: impl FnOnce(&mut Self)) {
        self.scopes.push(HashSet::new());
        for pat in pats {
            self.bind(pat);
        }
        body(self);
        self.scopes.pop();
    }

    /// Walk a function body with a fresh scope stack holding its parameters.
    fn function_body<'ast>(
        &mut self,
        inputs: &'ast Punctuated<syn::FnArg, Token![,]>,
        block: &'ast syn::Block,
    ) {
        let saved = std::mem::take(&mut self.scopes);
        let mut params = HashSet::new();
        for input in inputs {
            match input {
                syn::FnArg::Receiver(_) => {
                    params.insert("self".to_string());
                }
                syn::FnArg::Typed(typed) => {
                    let mut names = Vec::new();
                    bindings(&typed.pat, &mut names);
                    params.extend(names);
                }
            }
        }
        self.scopes.push(params);
        self.visit_block(block);
        self.scopes = saved;
    }

    fn resolve_callee(&self, path: &syn::Path) -> Option<FunctionId> {
        if path.leading_colon.is_none() && path.segments.len() == 1 {
            let name = path.segments[0].ident.to_string();
            if self.is_local(&name) {
                return None;
            }
        }
        let resolved = self
            .analyzer
            .index
            .resolve_path(&self.module, self.current_self_ty(), path);
        let (root, local) = resolved.split_first()?;
        if root != "crate" {
            return None;
        }
        let id = FunctionId(local.join("::"));
        self.analyzer.functions.contains(&id).then_some(id)
    }

    fn record(&mut self, call: &syn::ExprCall, function: FunctionId) {
        let mut location = self.unit.text.location(&self.unit.unit.path, call.span());
        if self.macro_depth > 0 {
            location = location.inside_macro();
        }

        let offending = call.args.iter().find_map(|arg| {
            let mut scanner = ArgScanner {
                index: self.analyzer.index,
                module: &self.module,
                self_ty: self.current_self_ty(),
                outer: &self.scopes,
                inner: inner_bindings(arg),
                found: None,
            };
            scanner.visit_expr(arg);
            scanner.found
        });

        let kind = match offending {
            Some(offending) => CallSiteKind::Rejected { offending },
            None => match self.analyzer.host.intercept(&location) {
                Some(token) => CallSiteKind::Accepted {
                    args: call
                        .args
                        .iter()
                        .map(|arg| self.unit.text.source_of(arg))
                        .collect(),
                    token,
                },
                None => {
                    tracing::debug!("No token issued for call to {} at {}", function, location);
                    self.outcomes
                        .push(CallSiteOutcome::Skipped { function, location });
                    return;
                }
            },
        };

        self.outcomes.push(CallSiteOutcome::Site(CallSite {
            function,
            location,
            caller_module: self.module.clone(),
            kind,
        }));
    }
}

impl<'ast> Visit<'ast> for BodyVisitor<'_, '_> {
    fn visit_item_mod(&mut self, m: &'ast syn::ItemMod) {
        if let Some((_, items)) = &m.content {
            self.module.push(m.ident.to_string());
            for item in items {
                self.visit_item(item);
            }
            self.module.pop();
        }
    }

    fn visit_item_impl(&mut self, i: &'ast syn::ItemImpl) {
        let self_ty = match i.self_ty.as_ref() {
            syn::Type::Path(p) if p.qself.is_none() => Some(self.analyzer.index.resolve_path(
                &self.module,
                None,
                &p.path,
            )),
            _ => None,
        };
        self.self_ty.push(self_ty);
        visit::visit_item_impl(self, i);
        self.self_ty.pop();
    }

    fn visit_item_fn(&mut self, f: &'ast syn::ItemFn) {
        self.function_body(&f.sig.inputs, &f.block);
    }

    fn visit_impl_item_fn(&mut self, f: &'ast syn::ImplItemFn) {
        self.function_body(&f.sig.inputs, &f.block);
    }

    fn visit_trait_item_fn(&mut self, f: &'ast syn::TraitItemFn) {
        if let Some(block) = &f.default {
            self.function_body(&f.sig.inputs, block);
        }
    }

    fn visit_block(&mut self, b: &'ast syn::Block) {
        self.with_scope(&[], |this| visit::visit_block(this, b));
    }

    fn visit_local(&mut self, l: &'ast syn::Local) {
        if let Some(init) = &l.init {
            self.visit_expr(&init.expr);
            if let Some((_, diverge)) = &init.diverge {
                self.visit_expr(diverge);
            }
        }
        self.bind(&l.pat);
    }

    fn visit_expr_closure(&mut self, c: &'ast syn::ExprClosure) {
        let pats: Vec<&syn::Pat> = c.inputs.iter().collect();
        self.with_scope(&pats, |this| this.visit_expr(&c.body));
    }

    fn visit_expr_for_loop(&mut self, f: &'ast syn::ExprForLoop) {
        self.visit_expr(&f.expr);
        self.with_scope(&[f.pat.as_ref()], |this| this.visit_block(&f.body));
    }

    fn visit_arm(&mut self, a: &'ast syn::Arm) {
        self.with_scope(&[&a.pat], |this| {
            if let Some((_, guard)) = &a.guard {
                this.visit_expr(guard);
            }
            this.visit_expr(&a.body);
        });
    }

    fn visit_expr_if(&mut self, i: &'ast syn::ExprIf) {
        let syn::Expr::Let(binding) = i.cond.as_ref() else {
            return visit::visit_expr_if(self, i);
        };
        self.visit_expr(&binding.expr);
        self.with_scope(&[binding.pat.as_ref()], |this| this.visit_block(&i.then_branch));
        if let Some((_, else_branch)) = &i.else_branch {
            self.visit_expr(else_branch);
        }
    }

    fn visit_expr_while(&mut self, w: &'ast syn::ExprWhile) {
        let syn::Expr::Let(binding) = w.cond.as_ref() else {
            return visit::visit_expr_while(self, w);
        };
        self.visit_expr(&binding.expr);
        self.with_scope(&[binding.pat.as_ref()], |this| this.visit_block(&w.body));
    }

    fn visit_expr_call(&mut self, call: &'ast syn::ExprCall) {
        if let syn::Expr::Path(callee) = call.func.as_ref() {
            if callee.qself.is_none() {
                if let Some(function) = self.resolve_callee(&callee.path) {
                    self.record(call, function);
                }
            }
        }
        visit::visit_expr_call(self, call);
    }

    fn visit_macro(&mut self, mac: &'ast syn::Macro) {
        if let Ok(args) = mac.parse_body_with(Punctuated::<syn::Expr, Token![,]>::parse_terminated) {
            self.macro_depth += 1;
            for arg in &args {
                self.visit_expr(arg);
            }
            self.macro_depth -= 1;
        }
    }
}

/// Looks for the first name in an argument that is not a compile-time
/// constant: a local, a parameter or a `static`.
struct ArgScanner<'s> {
    index: &'s SymbolIndex,
    module: &'s [String],
    self_ty: Option<&'s [String]>,
    outer: &'s [HashSet<String>],
    /// Names bound inside the argument itself.
    inner: HashSet<String>,
    found: Option<String>,
}

impl ArgScanner<'_> {
    fn check_name(&mut self, name: &str) {
        if self.found.is_none()
            && !self.inner.contains(name)
            && self.outer.iter().any(|scope| scope.contains(name))
        {
            self.found = Some(name.to_string());
        }
    }

    fn check_path(&mut self, path: &syn::Path) {
        if self.found.is_some() {
            return;
        }
        if path.leading_colon.is_none() && path.segments.len() == 1 {
            let name = path.segments[0].ident.to_string();
            if self.inner.contains(&name) {
                return;
            }
            self.check_name(&name);
            if self.found.is_some() {
                return;
            }
        }
        let resolved = self.index.resolve_path(self.module, self.self_ty, path);
        if self.index.is_static(&resolved) {
            self.found = Some(
                path.segments
                    .iter()
                    .map(|s| s.ident.to_string())
                    .collect::<Vec<_>>()
                    .join("::"),
            );
        }
    }

    fn check_tokens(&mut self, tokens: TokenStream) {
        for token in tokens {
            match token {
                TokenTree::Ident(ident) => self.check_name(&ident.to_string()),
                TokenTree::Group(group) => self.check_tokens(group.stream()),
                TokenTree::Literal(literal) => {
                    if let Ok(syn::Lit::Str(s)) = syn::parse_str::<syn::Lit>(&literal.to_string()) {
                        for name in format_captures(&s.value()) {
                            self.check_name(&name);
                        }
                    }
                }
                TokenTree::Punct(_) => {}
            }
        }
    }
}

impl<'ast> Visit<'ast> for ArgScanner<'_> {
    fn visit_expr_path(&mut self, p: &'ast syn::ExprPath) {
        if p.qself.is_none() {
            self.check_path(&p.path);
        }
    }

    fn visit_macro(&mut self, mac: &'ast syn::Macro) {
        match mac.parse_body_with(Punctuated::<syn::Expr, Token![,]>::parse_terminated) {
            Ok(args) => {
                for arg in &args {
                    if let syn::Expr::Lit(syn::ExprLit {
                        lit: syn::Lit::Str(s),
                        ..
                    }) = arg
                    {
                        for name in format_captures(&s.value()) {
                            self.check_name(&name);
                        }
                    }
                    self.visit_expr(arg);
                }
            }
            Err(_) => self.check_tokens(mac.tokens.clone()),
        }
    }
}

/// Names bound by closures, `let` statements and patterns inside `expr`.
fn inner_bindings(expr: &syn::Expr) -> HashSet<String> {
    struct Collector(Vec<String>);
    impl<'ast> Visit<'ast> for Collector {
        fn visit_pat(&mut self, pat: &'ast syn::Pat) {
            bindings(pat, &mut self.0);
        }
    }
    let mut collector = Collector(Vec::new());
    collector.visit_expr(expr);
    collector.0.into_iter().collect()
}

/// Identifiers introduced by a pattern. Capitalised identifiers are taken to
/// be unit variants or constants rather than bindings.
pub fn bindings(pat: &syn::Pat, out: &mut Vec<String>) {
    match pat {
        syn::Pat::Ident(p) => {
            let name = p.ident.to_string();
            if name.starts_with(|c: char| c.is_lowercase() || c == '_') {
                out.push(name);
            }
            if let Some((_, sub)) = &p.subpat {
                bindings(sub, out);
            }
        }
        syn::Pat::Tuple(t) => t.elems.iter().for_each(|p| bindings(p, out)),
        syn::Pat::TupleStruct(t) => t.elems.iter().for_each(|p| bindings(p, out)),
        syn::Pat::Struct(s) => s.fields.iter().for_each(|f| bindings(&f.pat, out)),
        syn::Pat::Slice(s) => s.elems.iter().for_each(|p| bindings(p, out)),
        syn::Pat::Or(o) => o.cases.iter().for_each(|p| bindings(p, out)),
        syn::Pat::Reference(r) => bindings(&r.pat, out),
        syn::Pat::Paren(p) => bindings(&p.pat, out),
        syn::Pat::Type(t) => bindings(&t.pat, out),
        _ => {}
    }
}

/// Identifiers captured implicitly by a format string, as in `"{name:>4}"`.
fn format_captures(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '{' {
            continue;
        }
        if chars.peek() == Some(&'{') {
            chars.next();
            continue;
        }
        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next == '_' || next.is_alphanumeric() {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }
        if name.starts_with(|c: char| c.is_alphabetic() || c == '_') {
            names.push(name);
        }
    }
    names
}
