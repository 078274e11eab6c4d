// SPDX-FileCopyrightText: © 2025 pyisolate authors

use crate::pyenv::RuntimeEnv;
use ruff_python_ast::{Stmt, StmtAssign, StmtImport, StmtImportFrom};
use ruff_text_size::Ranged;
use std::collections::HashSet;
use ustr::{ustr, Ustr};

/// One import statement or dynamic-import assignment. The statement text
/// is kept verbatim and reused unchanged in rendered output.
#[derive(Debug, Clone)]
pub struct ImportItem {
    /// local alias -> original dotted name; one statement can bind several
    pub names: Vec<(Ustr, Ustr)>,
    /// top-level module segment (`a` in `a.b.c`)
    pub module: Option<Ustr>,
    /// resolved distribution name; None for relative imports
    pub package_name: Option<Ustr>,
    /// remainder after the first dot
    pub submodule: Option<Ustr>,
    pub code: String,
    /// leading-dot count of relative imports
    pub level: u32,
    pub is_dynamic: bool,
    pub use_star: bool,
    /// names a dynamic-import assignment reads (its callee), empty for
    /// static imports
    pub free_names: Vec<Ustr>,
}

pub(crate) fn split_module(name: &str) -> (Ustr, Option<Ustr>) {
    match name.split_once('.') {
        Some((module, sub)) => (ustr(module), Some(ustr(sub))),
        None => (ustr(name), None),
    }
}

/// Collects top-level imports, statically declared or assigned from a
/// dynamic-import call. Stateful: aliases bound from the import
/// machinery are remembered so later `x = im('json')` calls resolve.
pub struct ImportCollector<'a> {
    source: &'a str,
    env: &'a RuntimeEnv,
    dynamic_refs: HashSet<Ustr>,
}

impl<'a> ImportCollector<'a> {
    pub fn new(source: &'a str, env: &'a RuntimeEnv) -> ImportCollector<'a> {
        ImportCollector {
            source,
            env,
            dynamic_refs: HashSet::new(),
        }
    }

    /// Returns the item for import statements and dynamic-import
    /// assignments; None for anything else.
    pub fn collect(&mut self, stmt: &Stmt) -> Option<ImportItem> {
        match stmt {
            Stmt::Import(imp) => Some(self.static_import(imp)),
            Stmt::ImportFrom(imp) => Some(self.from_import(imp)),
            Stmt::Assign(assign) => self.dynamic_import(assign),
            _ => None,
        }
    }

    fn static_import(&mut self, imp: &StmtImport) -> ImportItem {
        let mut names = Vec::with_capacity(imp.names.len());
        let mut module = None;
        let mut submodule = None;
        for (i, alias) in imp.names.iter().enumerate() {
            let name = alias.name.id.as_str();
            let (top, sub) = split_module(name);
            if i == 0 {
                module = Some(top);
                submodule = sub;
            }
            // without an explicit alias, `import a.b` binds `a`
            let bound = match &alias.asname {
                Some(asname) => ustr(asname.id.as_str()),
                None => top,
            };
            self.track_machinery(name, bound);
            names.push((bound, ustr(name)));
        }
        ImportItem {
            names,
            module,
            package_name: self.package_name(module, 0),
            submodule,
            code: self.code_of(imp.range()),
            level: 0,
            is_dynamic: false,
            use_star: false,
            free_names: Vec::new(),
        }
    }

    fn from_import(&mut self, imp: &StmtImportFrom) -> ImportItem {
        let (module, submodule) = match &imp.module {
            Some(m) => {
                let (top, sub) = split_module(m.as_str());
                (Some(top), sub)
            }
            None => (None, None),
        };
        let mut names = Vec::with_capacity(imp.names.len());
        let mut use_star = false;
        for alias in &imp.names {
            let name = alias.name.id.as_str();
            let mut bound = alias
                .asname
                .as_ref()
                .map(|n| n.id.as_str().to_string())
                .unwrap_or_else(|| name.to_string());
            if name == "*" {
                // synthesize a unique alias that still marks the wildcard
                use_star = true;
                bound = match (module, submodule) {
                    (Some(m), Some(s)) => format!("*_{}.{}", m, s),
                    (Some(m), None) => format!("*_{}", m),
                    _ => "*_".to_string(),
                };
            }
            let bound = ustr(&bound);
            self.track_machinery(name, bound);
            names.push((bound, ustr(name)));
        }
        ImportItem {
            names,
            module,
            package_name: self.package_name(module, imp.level),
            submodule,
            code: self.code_of(imp.range()),
            level: imp.level,
            is_dynamic: false,
            use_star,
            free_names: Vec::new(),
        }
    }

    /// `NAME = <machinery>('mod')` at module level. The first positional
    /// argument must be a string literal; a `package=` string literal
    /// overrides module resolution.
    fn dynamic_import(&mut self, assign: &StmtAssign) -> Option<ImportItem> {
        if assign.targets.len() != 1 {
            return None;
        }
        let target = assign.targets[0].as_name_expr()?;
        let call = assign.value.as_call_expr()?;
        let func_name = if let Some(n) = call.func.as_name_expr() {
            n.id.as_str()
        } else if let Some(a) = call.func.as_attribute_expr() {
            a.attr.id.as_str()
        } else {
            return None;
        };
        if !self.dynamic_refs.contains(&ustr(func_name))
            && !func_name.contains("__import__")
            && !func_name.contains("import_module")
        {
            return None;
        }
        let name = call
            .arguments
            .args
            .first()?
            .as_string_literal_expr()?
            .value
            .to_string();
        let (mut module, mut submodule) = split_module(&name);
        if let Some(kw) = call.arguments.find_keyword("package") {
            if let Some(pkg) = kw.value.as_string_literal_expr() {
                (module, submodule) = split_module(pkg.value.to_str());
            }
        }
        let usage = crate::usage::NameUsage::of_expr(&assign.value);
        Some(ImportItem {
            names: vec![(ustr(target.id.as_str()), ustr(&name))],
            module: Some(module),
            package_name: self.package_name(Some(module), 0),
            submodule,
            code: self.code_of(assign.range()),
            level: 0,
            is_dynamic: true,
            use_star: false,
            free_names: usage.free_names(),
        })
    }

    fn track_machinery(&mut self, original: &str, bound: Ustr) {
        if original.contains("importlib") || original.contains("import_module") {
            self.dynamic_refs.insert(bound);
        }
    }

    fn package_name(&self, module: Option<Ustr>, level: u32) -> Option<Ustr> {
        if level > 0 {
            return None;
        }
        let module = module?;
        if self.env.is_stdlib(module.as_str()) {
            Some(module)
        } else {
            Some(self.env.dists.get(module.as_str()).unwrap_or(module))
        }
    }

    fn code_of(&self, range: ruff_text_size::TextRange) -> String {
        self.source[range.start().to_usize()..range.end().to_usize()].to_string()
    }
}
