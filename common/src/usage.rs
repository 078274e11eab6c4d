// SPDX-FileCopyrightText: © 2025 pyisolate authors

use ruff_python_ast::{self as ast, ExceptHandler, Expr, ExprContext, Pattern, Stmt};
use std::collections::HashSet;
use ustr::{ustr, Ustr};

/// Set of names preserving first-discovery order. Closure worklists and
/// rendering both depend on this order being stable.
#[derive(Debug, Default, Clone)]
pub struct NameSet {
    seen: HashSet<Ustr>,
    order: Vec<Ustr>,
}

impl NameSet {
    pub fn insert(&mut self, name: Ustr) -> bool {
        if self.seen.insert(name) {
            self.order.push(name);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, name: &Ustr) -> bool {
        self.seen.contains(name)
    }

    pub fn as_slice(&self) -> &[Ustr] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}

/// Names used and bound inside one subtree.
///
/// Function and assignment bindings are flattened: a binding at any
/// depth shadows the name throughout the subtree, which is precise
/// enough for per-top-level-definition free sets. Comprehension targets
/// and lambda parameters are the exception: they never escape their own
/// expression, so they live on a scope stack that is popped as soon as
/// the expression ends.
#[derive(Debug, Default)]
pub struct NameUsage {
    /// bare-name and attribute-root loads, in source order
    loads: NameSet,
    /// left-most components of attribute chains (`pkg` in `pkg.mod.attr`)
    pub attr_roots: HashSet<Ustr>,
    /// bare-name references
    pub names: HashSet<Ustr>,
    /// parameters of any callable in the subtree
    pub params: HashSet<Ustr>,
    /// names assigned or otherwise bound within the subtree
    pub locals: HashSet<Ustr>,
    /// names declared `global`, exempt from local shadowing
    declared_global: HashSet<Ustr>,
    /// names used in annotation positions only, routed separately
    pub type_refs: NameSet,
    /// comprehension-target / lambda-parameter frames, innermost last
    scopes: Vec<HashSet<Ustr>>,
    in_annotation: bool,
}

impl NameUsage {
    pub fn of_stmt(stmt: &Stmt) -> NameUsage {
        let mut usage = NameUsage::default();
        usage.collect_stmt(stmt);
        usage
    }

    pub fn of_expr(expr: &Expr) -> NameUsage {
        let mut usage = NameUsage::default();
        usage.collect_expr(expr);
        usage
    }

    /// Loaded names that no parameter or local shadows, in first-use order.
    pub fn free_names(&self) -> Vec<Ustr> {
        self.loads
            .as_slice()
            .iter()
            .copied()
            .filter(|n| !self.shadowed(n))
            .collect()
    }

    /// Annotation-only names, same shadowing rule.
    pub fn free_type_refs(&self) -> Vec<Ustr> {
        self.type_refs
            .as_slice()
            .iter()
            .copied()
            .filter(|n| !self.shadowed(n) && !self.loads.contains(n))
            .collect()
    }

    fn shadowed(&self, name: &Ustr) -> bool {
        self.params.contains(name)
            || (self.locals.contains(name) && !self.declared_global.contains(name))
    }

    fn load(&mut self, name: &str, attr_root: bool) {
        let n = ustr(name);
        if self.scopes.iter().any(|frame| frame.contains(&n)) {
            return;
        }
        if self.in_annotation {
            self.type_refs.insert(n);
            return;
        }
        self.loads.insert(n);
        if attr_root {
            self.attr_roots.insert(n);
        } else {
            self.names.insert(n);
        }
    }

    fn bind_local(&mut self, name: &str) {
        self.locals.insert(ustr(name));
    }

    fn bind_param(&mut self, name: &str) {
        self.params.insert(ustr(name));
    }

    fn bind_scoped(&mut self, name: &str) {
        match self.scopes.last_mut() {
            Some(frame) => {
                frame.insert(ustr(name));
            }
            None => self.bind_local(name),
        }
    }

    fn collect_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(d) => {
                self.bind_local(d.name.id.as_str());
                for dec in &d.decorator_list {
                    self.collect_expr(&dec.expression);
                }
                if let Some(tp) = &d.type_params {
                    self.collect_type_params(tp);
                }
                self.collect_parameters(&d.parameters);
                if let Some(returns) = &d.returns {
                    self.collect_annotation(returns);
                }
                self.collect_body(&d.body);
            }
            Stmt::ClassDef(d) => {
                self.bind_local(d.name.id.as_str());
                for dec in &d.decorator_list {
                    self.collect_expr(&dec.expression);
                }
                if let Some(tp) = &d.type_params {
                    self.collect_type_params(tp);
                }
                if let Some(args) = &d.arguments {
                    for base in args.args.iter() {
                        self.collect_expr(base);
                    }
                    for kw in args.keywords.iter() {
                        self.collect_expr(&kw.value);
                    }
                }
                self.collect_body(&d.body);
            }
            Stmt::Return(r) => {
                if let Some(value) = &r.value {
                    self.collect_expr(value);
                }
            }
            Stmt::Delete(d) => {
                for target in &d.targets {
                    self.collect_target(target);
                }
            }
            Stmt::Assign(a) => {
                self.collect_expr(&a.value);
                for target in &a.targets {
                    self.collect_target(target);
                }
            }
            Stmt::AugAssign(a) => {
                self.collect_expr(&a.value);
                self.collect_target(&a.target);
            }
            Stmt::AnnAssign(a) => {
                self.collect_annotation(&a.annotation);
                if let Some(value) = &a.value {
                    self.collect_expr(value);
                }
                self.collect_target(&a.target);
            }
            Stmt::TypeAlias(t) => {
                self.collect_target(&t.name);
                if let Some(tp) = &t.type_params {
                    self.collect_type_params(tp);
                }
                self.collect_annotation(&t.value);
            }
            Stmt::For(f) => {
                self.collect_expr(&f.iter);
                self.collect_target(&f.target);
                self.collect_body(&f.body);
                self.collect_body(&f.orelse);
            }
            Stmt::While(w) => {
                self.collect_expr(&w.test);
                self.collect_body(&w.body);
                self.collect_body(&w.orelse);
            }
            Stmt::If(i) => {
                self.collect_expr(&i.test);
                self.collect_body(&i.body);
                for clause in &i.elif_else_clauses {
                    if let Some(test) = &clause.test {
                        self.collect_expr(test);
                    }
                    self.collect_body(&clause.body);
                }
            }
            Stmt::With(w) => {
                for item in &w.items {
                    self.collect_expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.collect_target(vars);
                    }
                }
                self.collect_body(&w.body);
            }
            Stmt::Match(m) => {
                self.collect_expr(&m.subject);
                for case in &m.cases {
                    self.collect_pattern(&case.pattern);
                    if let Some(guard) = &case.guard {
                        self.collect_expr(guard);
                    }
                    self.collect_body(&case.body);
                }
            }
            Stmt::Raise(r) => {
                if let Some(exc) = &r.exc {
                    self.collect_expr(exc);
                }
                if let Some(cause) = &r.cause {
                    self.collect_expr(cause);
                }
            }
            Stmt::Try(t) => {
                self.collect_body(&t.body);
                for handler in &t.handlers {
                    let ExceptHandler::ExceptHandler(h) = handler;
                    if let Some(ty) = &h.type_ {
                        self.collect_expr(ty);
                    }
                    if let Some(name) = &h.name {
                        self.bind_local(name.id.as_str());
                    }
                    self.collect_body(&h.body);
                }
                self.collect_body(&t.orelse);
                self.collect_body(&t.finalbody);
            }
            Stmt::Assert(a) => {
                self.collect_expr(&a.test);
                if let Some(msg) = &a.msg {
                    self.collect_expr(msg);
                }
            }
            Stmt::Import(imp) => {
                for alias in &imp.names {
                    match &alias.asname {
                        Some(asname) => self.bind_local(asname.id.as_str()),
                        // `import a.b` binds the top-level name
                        None => {
                            let name = alias.name.id.as_str();
                            let top = name.split('.').next().unwrap_or(name);
                            self.bind_local(top);
                        }
                    }
                }
            }
            Stmt::ImportFrom(imp) => {
                for alias in &imp.names {
                    let bound = alias
                        .asname
                        .as_ref()
                        .map(|n| n.id.as_str())
                        .unwrap_or(alias.name.id.as_str());
                    if bound != "*" {
                        self.bind_local(bound);
                    }
                }
            }
            Stmt::Global(g) => {
                for name in &g.names {
                    self.declared_global.insert(ustr(name.id.as_str()));
                }
            }
            Stmt::Nonlocal(_) => {}
            Stmt::Expr(e) => self.collect_expr(&e.value),
            Stmt::Pass(_) | Stmt::Break(_) | Stmt::Continue(_) => {}
            Stmt::IpyEscapeCommand(_) => {}
        }
    }

    fn collect_body(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.collect_stmt(stmt);
        }
    }

    fn collect_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Name(n) => match n.ctx {
                ExprContext::Load => self.load(n.id.as_str(), false),
                ExprContext::Store | ExprContext::Del => self.bind_local(n.id.as_str()),
                ExprContext::Invalid => {}
            },
            Expr::Attribute(a) => {
                // only the left-most name of a chain is a dependency root
                if let Some(base) = a.value.as_name_expr() {
                    self.load(base.id.as_str(), true);
                } else {
                    self.collect_expr(&a.value);
                }
            }
            Expr::Call(c) => {
                self.collect_expr(&c.func);
                for arg in c.arguments.args.iter() {
                    self.collect_expr(arg);
                }
                for kw in c.arguments.keywords.iter() {
                    self.collect_expr(&kw.value);
                }
            }
            Expr::Lambda(l) => {
                // defaults are evaluated in the enclosing scope
                if let Some(params) = &l.parameters {
                    for p in params
                        .posonlyargs
                        .iter()
                        .chain(&params.args)
                        .chain(&params.kwonlyargs)
                    {
                        if let Some(default) = &p.default {
                            self.collect_expr(default);
                        }
                    }
                }
                self.scopes.push(HashSet::new());
                if let Some(params) = &l.parameters {
                    for p in params
                        .posonlyargs
                        .iter()
                        .chain(&params.args)
                        .chain(&params.kwonlyargs)
                    {
                        self.bind_scoped(p.parameter.name.id.as_str());
                    }
                    if let Some(vararg) = &params.vararg {
                        self.bind_scoped(vararg.name.id.as_str());
                    }
                    if let Some(kwarg) = &params.kwarg {
                        self.bind_scoped(kwarg.name.id.as_str());
                    }
                }
                self.collect_expr(&l.body);
                self.scopes.pop();
            }
            Expr::ListComp(c) => {
                self.collect_comprehension(&c.generators, &[c.elt.as_ref()]);
            }
            Expr::SetComp(c) => {
                self.collect_comprehension(&c.generators, &[c.elt.as_ref()]);
            }
            Expr::DictComp(c) => {
                match c.key.as_deref() {
                    Some(key) => self.collect_comprehension(&c.generators, &[key, c.value.as_ref()]),
                    None => self.collect_comprehension(&c.generators, &[c.value.as_ref()]),
                }
            }
            Expr::Generator(c) => {
                self.collect_comprehension(&c.generators, &[c.elt.as_ref()]);
            }
            Expr::BoolOp(b) => {
                for value in b.values.iter() {
                    self.collect_expr(value);
                }
            }
            Expr::Named(n) => {
                self.collect_expr(&n.value);
                self.collect_target(&n.target);
            }
            Expr::BinOp(b) => {
                self.collect_expr(&b.left);
                self.collect_expr(&b.right);
            }
            Expr::UnaryOp(u) => self.collect_expr(&u.operand),
            Expr::If(i) => {
                self.collect_expr(&i.test);
                self.collect_expr(&i.body);
                self.collect_expr(&i.orelse);
            }
            Expr::Dict(d) => {
                for item in &d.items {
                    if let Some(key) = &item.key {
                        self.collect_expr(key);
                    }
                    self.collect_expr(&item.value);
                }
            }
            Expr::Set(s) => {
                for elt in &s.elts {
                    self.collect_expr(elt);
                }
            }
            Expr::Await(a) => self.collect_expr(&a.value),
            Expr::Yield(y) => {
                if let Some(value) = &y.value {
                    self.collect_expr(value);
                }
            }
            Expr::YieldFrom(y) => self.collect_expr(&y.value),
            Expr::Compare(c) => {
                self.collect_expr(&c.left);
                for comparator in c.comparators.iter() {
                    self.collect_expr(comparator);
                }
            }
            Expr::FString(f) => {
                for element in f.value.elements() {
                    if let ast::InterpolatedStringElement::Interpolation(e) = element {
                        self.collect_expr(&e.expression);
                        if let Some(spec) = &e.format_spec {
                            for nested in spec.elements.iter() {
                                if let ast::InterpolatedStringElement::Interpolation(ne) = nested {
                                    self.collect_expr(&ne.expression);
                                }
                            }
                        }
                    }
                }
            }
            Expr::Subscript(s) => {
                self.collect_expr(&s.value);
                self.collect_expr(&s.slice);
            }
            Expr::Starred(s) => self.collect_expr(&s.value),
            Expr::List(l) => {
                for elt in &l.elts {
                    self.collect_expr(elt);
                }
            }
            Expr::Tuple(t) => {
                for elt in &t.elts {
                    self.collect_expr(elt);
                }
            }
            Expr::Slice(s) => {
                if let Some(lower) = &s.lower {
                    self.collect_expr(lower);
                }
                if let Some(upper) = &s.upper {
                    self.collect_expr(upper);
                }
                if let Some(step) = &s.step {
                    self.collect_expr(step);
                }
            }
            Expr::StringLiteral(_)
            | Expr::BytesLiteral(_)
            | Expr::NumberLiteral(_)
            | Expr::BooleanLiteral(_)
            | Expr::NoneLiteral(_)
            | Expr::EllipsisLiteral(_)
            | Expr::IpyEscapeCommand(_) => {}
        }
    }

    /// Assignment-like positions: names bind, subscript/attribute bases load.
    fn collect_target(&mut self, expr: &Expr) {
        match expr {
            Expr::Name(n) => self.bind_local(n.id.as_str()),
            Expr::Tuple(t) => {
                for elt in &t.elts {
                    self.collect_target(elt);
                }
            }
            Expr::List(l) => {
                for elt in &l.elts {
                    self.collect_target(elt);
                }
            }
            Expr::Starred(s) => self.collect_target(&s.value),
            _ => self.collect_expr(expr),
        }
    }

    fn collect_parameters(&mut self, params: &ast::Parameters) {
        for p in params
            .posonlyargs
            .iter()
            .chain(&params.args)
            .chain(&params.kwonlyargs)
        {
            self.bind_param(p.parameter.name.id.as_str());
            if let Some(annotation) = &p.parameter.annotation {
                self.collect_annotation(annotation);
            }
            if let Some(default) = &p.default {
                self.collect_expr(default);
            }
        }
        if let Some(vararg) = &params.vararg {
            self.bind_param(vararg.name.id.as_str());
            if let Some(annotation) = &vararg.annotation {
                self.collect_annotation(annotation);
            }
        }
        if let Some(kwarg) = &params.kwarg {
            self.bind_param(kwarg.name.id.as_str());
            if let Some(annotation) = &kwarg.annotation {
                self.collect_annotation(annotation);
            }
        }
    }

    fn collect_annotation(&mut self, expr: &Expr) {
        let prev = self.in_annotation;
        self.in_annotation = true;
        self.collect_expr(expr);
        self.in_annotation = prev;
    }

    /// Comprehension targets shadow only within the comprehension
    /// itself; each iter is walked before that generator's targets
    /// join the frame, so the outermost iterable stays free.
    fn collect_comprehension(&mut self, generators: &[ast::Comprehension], exprs: &[&Expr]) {
        self.scopes.push(HashSet::new());
        for comp in generators {
            self.collect_expr(&comp.iter);
            self.collect_scoped_target(&comp.target);
            for cond in &comp.ifs {
                self.collect_expr(cond);
            }
        }
        for expr in exprs {
            self.collect_expr(expr);
        }
        self.scopes.pop();
    }

    fn collect_scoped_target(&mut self, expr: &Expr) {
        match expr {
            Expr::Name(n) => self.bind_scoped(n.id.as_str()),
            Expr::Tuple(t) => {
                for elt in &t.elts {
                    self.collect_scoped_target(elt);
                }
            }
            Expr::List(l) => {
                for elt in &l.elts {
                    self.collect_scoped_target(elt);
                }
            }
            Expr::Starred(s) => self.collect_scoped_target(&s.value),
            _ => self.collect_expr(expr),
        }
    }

    fn collect_type_params(&mut self, type_params: &ast::TypeParams) {
        for tp in &type_params.type_params {
            match tp {
                ast::TypeParam::TypeVar(t) => {
                    self.bind_local(t.name.id.as_str());
                    if let Some(bound) = &t.bound {
                        self.collect_annotation(bound);
                    }
                    if let Some(default) = &t.default {
                        self.collect_annotation(default);
                    }
                }
                ast::TypeParam::ParamSpec(t) => {
                    self.bind_local(t.name.id.as_str());
                    if let Some(default) = &t.default {
                        self.collect_annotation(default);
                    }
                }
                ast::TypeParam::TypeVarTuple(t) => {
                    self.bind_local(t.name.id.as_str());
                    if let Some(default) = &t.default {
                        self.collect_annotation(default);
                    }
                }
            }
        }
    }

    fn collect_pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::MatchValue(p) => self.collect_expr(&p.value),
            Pattern::MatchSingleton(_) => {}
            Pattern::MatchSequence(p) => {
                for sub in &p.patterns {
                    self.collect_pattern(sub);
                }
            }
            Pattern::MatchMapping(p) => {
                for key in &p.keys {
                    self.collect_expr(key);
                }
                for sub in &p.patterns {
                    self.collect_pattern(sub);
                }
                if let Some(rest) = &p.rest {
                    self.bind_local(rest.id.as_str());
                }
            }
            Pattern::MatchClass(p) => {
                self.collect_expr(&p.cls);
                for sub in &p.arguments.patterns {
                    self.collect_pattern(sub);
                }
                for kw in &p.arguments.keywords {
                    self.collect_pattern(&kw.pattern);
                }
            }
            Pattern::MatchStar(p) => {
                if let Some(name) = &p.name {
                    self.bind_local(name.id.as_str());
                }
            }
            Pattern::MatchAs(p) => {
                if let Some(sub) = &p.pattern {
                    self.collect_pattern(sub);
                }
                if let Some(name) = &p.name {
                    self.bind_local(name.id.as_str());
                }
            }
            Pattern::MatchOr(p) => {
                for sub in &p.patterns {
                    self.collect_pattern(sub);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruff_python_parser::parse_module;

    fn usage_of(src: &str) -> NameUsage {
        let parsed = parse_module(src).unwrap();
        NameUsage::of_stmt(&parsed.syntax().body[0])
    }

    fn names(v: &[Ustr]) -> Vec<&str> {
        v.iter().map(|u| u.as_str()).collect()
    }

    #[test]
    fn params_and_locals_shadow() {
        let u = usage_of("def f(a, b=DEFAULT):\n    c = helper(a)\n    return b + c + other\n");
        assert_eq!(names(&u.free_names()), vec!["DEFAULT", "helper", "other"]);
        assert!(u.params.contains(&ustr("a")));
        assert!(u.params.contains(&ustr("b")));
        assert!(u.locals.contains(&ustr("c")));
    }

    #[test]
    fn attribute_roots_are_leftmost_names() {
        let u = usage_of("def g(s):\n    return pkg.mod.attr(s) + bare\n");
        assert!(u.attr_roots.contains(&ustr("pkg")));
        assert!(u.names.contains(&ustr("bare")));
        assert_eq!(names(&u.free_names()), vec!["pkg", "bare"]);
    }

    #[test]
    fn call_in_chain_still_reaches_base() {
        let u = usage_of("def g():\n    return a.b(x).c\n");
        assert!(u.attr_roots.contains(&ustr("a")));
        assert!(u.names.contains(&ustr("x")));
    }

    #[test]
    fn comprehension_targets_shadow() {
        let u = usage_of("def h(xs):\n    return [math.sqrt(x) for x in xs if x > lim]\n");
        // generators are walked before the element expression
        assert_eq!(names(&u.free_names()), vec!["lim", "math"]);
    }

    #[test]
    fn comprehension_targets_do_not_leak() {
        let u = usage_of(
            "def f(data):\n    paths = [BASE for BASE in data]\n    return BASE + 1\n",
        );
        // the comprehension's BASE is its own; the trailing BASE is free
        assert_eq!(names(&u.free_names()), vec!["BASE"]);
        assert!(!u.locals.contains(&ustr("BASE")));
    }

    #[test]
    fn nested_comprehension_scopes_pop_in_order() {
        let u = usage_of(
            "def f(rows):\n    flat = [c for r in rows for c in [x for x in r]]\n    return c\n",
        );
        assert_eq!(names(&u.free_names()), vec!["c"]);
    }

    #[test]
    fn lambda_params_do_not_leak() {
        let u = usage_of("def f():\n    g = lambda q: q * 2\n    return q\n");
        assert_eq!(names(&u.free_names()), vec!["q"]);
    }

    #[test]
    fn lambda_defaults_evaluate_in_enclosing_scope() {
        let u = usage_of("def f():\n    g = lambda q=q: q\n    return g()\n");
        assert_eq!(names(&u.free_names()), vec!["q"]);
    }

    #[test]
    fn for_targets_bind_in_enclosing_scope() {
        let u = usage_of("def f(xs):\n    for item in xs:\n        pass\n    return item\n");
        // unlike comprehension targets, for-loop targets leak in Python
        assert!(u.free_names().is_empty());
        assert!(u.locals.contains(&ustr("item")));
    }

    #[test]
    fn class_bases_metaclass_and_decorators_count() {
        let u = usage_of("@deco\nclass C(Base, metaclass=Meta):\n    def m(self, x):\n        return x\n");
        let free = names(&u.free_names());
        assert!(free.contains(&"deco"));
        assert!(free.contains(&"Base"));
        assert!(free.contains(&"Meta"));
        assert!(!free.contains(&"self"));
        assert!(!free.contains(&"x"));
    }

    #[test]
    fn annotations_route_to_type_refs() {
        let u = usage_of("def f(x: Vec, y) -> Out:\n    z: Inner = y\n    return z\n");
        let types = names(&u.free_type_refs());
        assert!(types.contains(&"Vec"));
        assert!(types.contains(&"Out"));
        assert!(types.contains(&"Inner"));
        assert!(!names(&u.free_names()).contains(&"Vec"));
    }

    #[test]
    fn runtime_use_trumps_annotation_only() {
        let u = usage_of("def f(x: T):\n    return T()\n");
        assert!(names(&u.free_names()).contains(&"T"));
        assert!(!names(&u.free_type_refs()).contains(&"T"));
    }

    #[test]
    fn nested_imports_bind_locally() {
        let u = usage_of("def f():\n    import json\n    return json.dumps({})\n");
        assert!(u.free_names().is_empty());
    }

    #[test]
    fn global_declaration_defeats_shadowing() {
        let u = usage_of("def bump():\n    global COUNT\n    COUNT = COUNT + 1\n    return COUNT\n");
        assert_eq!(names(&u.free_names()), vec!["COUNT"]);
    }

    #[test]
    fn walrus_and_lambda_bind() {
        let u = usage_of("def f(xs):\n    g = lambda q: q + off\n    if (n := len(xs)) > 0:\n        return g(n)\n    return 0\n");
        assert_eq!(names(&u.free_names()), vec!["off", "len"]);
    }

    #[test]
    fn fstrings_are_walked() {
        let u = usage_of("def f(x):\n    return f'{prefix}{x:{width}}'\n");
        let free = names(&u.free_names());
        assert!(free.contains(&"prefix"));
        assert!(free.contains(&"width"));
    }

    #[test]
    fn store_attribute_loads_base() {
        let u = usage_of("def f():\n    cfg.value = 1\n    return None\n");
        assert!(u.attr_roots.contains(&ustr("cfg")));
    }

    #[test]
    fn expr_usage_collects_rhs() {
        let parsed = parse_module("LOCAL = f\n").unwrap();
        let Stmt::Assign(a) = &parsed.syntax().body[0] else {
            panic!("expected assignment");
        };
        let u = NameUsage::of_expr(&a.value);
        assert_eq!(names(&u.free_names()), vec!["f"]);
    }
}
