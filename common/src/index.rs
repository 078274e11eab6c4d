// SPDX-FileCopyrightText: © 2025 pyisolate authors

use crate::defs::{ann_var_item, def_item, var_item, DefItem, PruneFlags, VarsItem};
use crate::imports::{ImportCollector, ImportItem};
use crate::parser::SourceTree;
use crate::pyenv::RuntimeEnv;
use crate::source::ModuleHandle;
use log::debug;
use ruff_python_ast::Stmt;
use std::collections::HashMap;
use ustr::Ustr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Import(usize),
    Def(usize),
    Var(usize),
}

/// Catalogs of one module's top-level imports, definitions, and
/// variables, plus a name -> binding map. The map is written in source
/// order, so a later binding of the same name shadows an earlier one,
/// matching interpreter semantics. Immutable once built.
#[derive(Debug)]
pub struct ModuleIndex {
    pub module: ModuleHandle,
    pub imports: Vec<ImportItem>,
    pub defs: Vec<DefItem>,
    pub vars: Vec<VarsItem>,
    bindings: HashMap<Ustr, Binding>,
    star_imports: Vec<usize>,
}

impl ModuleIndex {
    pub fn build(
        source: &str,
        module: ModuleHandle,
        tree: &SourceTree,
        env: &RuntimeEnv,
        flags: PruneFlags,
    ) -> ModuleIndex {
        let mut index = ModuleIndex {
            module,
            imports: Vec::new(),
            defs: Vec::new(),
            vars: Vec::new(),
            bindings: HashMap::new(),
            star_imports: Vec::new(),
        };
        let mut collector = ImportCollector::new(source, env);
        for stmt in tree.body() {
            match stmt {
                Stmt::Import(_) | Stmt::ImportFrom(_) => {
                    if let Some(item) = collector.collect(stmt) {
                        index.push_import(item);
                    }
                }
                Stmt::Assign(assign) => {
                    // dynamic imports claim the assignment; it is not a var
                    if let Some(item) = collector.collect(stmt) {
                        index.push_import(item);
                    } else if let Some(var) = var_item(assign, source) {
                        index.push_var(var);
                    }
                }
                Stmt::AnnAssign(assign) => {
                    if let Some(var) = ann_var_item(assign, source) {
                        index.push_var(var);
                    }
                }
                Stmt::FunctionDef(_) | Stmt::ClassDef(_) => {
                    if let Some(def) = def_item(stmt, source, flags) {
                        index.push_def(def);
                    }
                }
                _ => {}
            }
        }
        debug!(
            "indexed {}: {} imports, {} defs, {} vars",
            index.module.name,
            index.imports.len(),
            index.defs.len(),
            index.vars.len()
        );
        index
    }

    pub fn binding(&self, name: Ustr) -> Option<Binding> {
        self.bindings.get(&name).copied()
    }

    pub fn has_star_imports(&self) -> bool {
        !self.star_imports.is_empty()
    }

    pub fn star_imports(&self) -> &[usize] {
        &self.star_imports
    }

    fn push_import(&mut self, item: ImportItem) {
        let idx = self.imports.len();
        for (alias, _) in &item.names {
            self.bindings.insert(*alias, Binding::Import(idx));
        }
        if item.use_star {
            self.star_imports.push(idx);
        }
        self.imports.push(item);
    }

    fn push_def(&mut self, item: DefItem) {
        let idx = self.defs.len();
        self.bindings.insert(item.name, Binding::Def(idx));
        self.defs.push(item);
    }

    fn push_var(&mut self, item: VarsItem) {
        let idx = self.vars.len();
        self.bindings.insert(item.name, Binding::Var(idx));
        self.vars.push(item);
    }
}
