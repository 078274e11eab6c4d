// SPDX-FileCopyrightText: © 2025 pyisolate authors

use crate::usage::NameUsage;
use ruff_python_ast::{AtomicNodeIndex, ExceptHandler, Stmt, StmtAnnAssign, StmtAssign, StmtPass};
use ruff_text_size::{Ranged, TextRange};
use std::fmt::Display;
use thin_vec::ThinVec;
use ustr::{ustr, Ustr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefKind {
    Class,
    Function,
    AsyncFunction,
}

impl Display for DefKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DefKind::Class => "class",
            DefKind::Function => "function",
            DefKind::AsyncFunction => "async-function",
        };
        f.write_str(s)
    }
}

/// A top-level function or class. `node` is the original subtree and
/// drives free-name extraction; `pruned` has nested definitions removed
/// and drives rendering; `code` is the verbatim source, kept as a
/// rendering fallback.
#[derive(Debug, Clone)]
pub struct DefItem {
    pub name: Ustr,
    pub kind: DefKind,
    pub node: Stmt,
    pub pruned: Stmt,
    pub code: String,
    pub free_names: Vec<Ustr>,
    pub type_refs: Vec<Ustr>,
}

/// A top-level `NAME = expr` (or annotated) assignment.
#[derive(Debug, Clone)]
pub struct VarsItem {
    pub name: Ustr,
    pub code: String,
    pub free_names: Vec<Ustr>,
    pub type_refs: Vec<Ustr>,
}

#[derive(Debug, Clone, Copy)]
pub struct PruneFlags {
    pub collapse_inner_functions: bool,
    pub collapse_methods: bool,
}

impl Default for PruneFlags {
    fn default() -> Self {
        PruneFlags {
            collapse_inner_functions: true,
            collapse_methods: true,
        }
    }
}

pub fn def_item(stmt: &Stmt, source: &str, flags: PruneFlags) -> Option<DefItem> {
    let (name, kind) = match stmt {
        Stmt::FunctionDef(d) => (
            ustr(d.name.id.as_str()),
            if d.is_async {
                DefKind::AsyncFunction
            } else {
                DefKind::Function
            },
        ),
        Stmt::ClassDef(d) => (ustr(d.name.id.as_str()), DefKind::Class),
        _ => return None,
    };
    let usage = NameUsage::of_stmt(stmt);
    Some(DefItem {
        name,
        kind,
        node: stmt.clone(),
        pruned: prune(stmt, flags),
        code: slice(source, stmt.range()),
        free_names: usage.free_names(),
        type_refs: usage.free_type_refs(),
    })
}

/// `NAME = expr` with a single name target; anything else is not a
/// module variable.
pub fn var_item(assign: &StmtAssign, source: &str) -> Option<VarsItem> {
    if assign.targets.len() != 1 {
        return None;
    }
    let target = assign.targets[0].as_name_expr()?;
    let usage = NameUsage::of_expr(&assign.value);
    Some(VarsItem {
        name: ustr(target.id.as_str()),
        code: slice(source, assign.range()),
        free_names: usage.free_names(),
        type_refs: usage.free_type_refs(),
    })
}

/// `NAME: T = expr`; the annotation is routed as a type reference.
pub fn ann_var_item(assign: &StmtAnnAssign, source: &str) -> Option<VarsItem> {
    let target = assign.target.as_name_expr()?;
    let value = assign.value.as_deref()?;
    let value_usage = NameUsage::of_expr(value);
    let ann_usage = NameUsage::of_expr(&assign.annotation);
    let mut type_refs = ann_usage.free_names();
    type_refs.retain(|n| !value_usage.free_names().contains(n));
    Some(VarsItem {
        name: ustr(target.id.as_str()),
        code: slice(source, assign.range()),
        free_names: value_usage.free_names(),
        type_refs,
    })
}

fn slice(source: &str, range: TextRange) -> String {
    source[range.start().to_usize()..range.end().to_usize()].to_string()
}

#[derive(Clone, Copy, PartialEq)]
enum Owner {
    Function,
    Class,
}

/// Deep-copy a definition with nested definitions removed at any depth.
/// Bodies emptied by the removal get a `pass` placeholder so the pruned
/// tree stays valid.
pub fn prune(stmt: &Stmt, flags: PruneFlags) -> Stmt {
    let mut pruned = stmt.clone();
    match &mut pruned {
        Stmt::FunctionDef(d) => prune_body(&mut d.body, Owner::Function, flags),
        Stmt::ClassDef(d) => prune_body(&mut d.body, Owner::Class, flags),
        _ => {}
    }
    pruned
}

fn prune_body(body: &mut ThinVec<Stmt>, owner: Owner, flags: PruneFlags) {
    let drop_defs = match owner {
        Owner::Function => flags.collapse_inner_functions,
        Owner::Class => flags.collapse_methods,
    };
    if drop_defs {
        body.retain(|s| !matches!(s, Stmt::FunctionDef(_) | Stmt::ClassDef(_)));
    }
    for stmt in body.iter_mut() {
        prune_inner(stmt, owner, flags);
    }
    if body.is_empty() {
        body.push(Stmt::Pass(StmtPass {
            range: TextRange::default(),
            node_index: AtomicNodeIndex::default(),
        }));
    }
}

fn prune_inner(stmt: &mut Stmt, owner: Owner, flags: PruneFlags) {
    match stmt {
        // definitions surviving a disabled flag still get their own
        // bodies pruned under their own ownership
        Stmt::FunctionDef(d) => prune_body(&mut d.body, Owner::Function, flags),
        Stmt::ClassDef(d) => prune_body(&mut d.body, Owner::Class, flags),
        Stmt::If(i) => {
            prune_body(&mut i.body, owner, flags);
            for clause in &mut i.elif_else_clauses {
                prune_body(&mut clause.body, owner, flags);
            }
        }
        Stmt::For(f) => {
            prune_body(&mut f.body, owner, flags);
            prune_body_allow_empty(&mut f.orelse, owner, flags);
        }
        Stmt::While(w) => {
            prune_body(&mut w.body, owner, flags);
            prune_body_allow_empty(&mut w.orelse, owner, flags);
        }
        Stmt::With(w) => prune_body(&mut w.body, owner, flags),
        Stmt::Try(t) => {
            prune_body(&mut t.body, owner, flags);
            for handler in &mut t.handlers {
                let ExceptHandler::ExceptHandler(h) = handler;
                prune_body(&mut h.body, owner, flags);
            }
            prune_body_allow_empty(&mut t.orelse, owner, flags);
            prune_body_allow_empty(&mut t.finalbody, owner, flags);
        }
        Stmt::Match(m) => {
            for case in &mut m.cases {
                prune_body(&mut case.body, owner, flags);
            }
        }
        _ => {}
    }
}

/// `else`/`finally` arms may legitimately be absent; do not pad them.
fn prune_body_allow_empty(body: &mut ThinVec<Stmt>, owner: Owner, flags: PruneFlags) {
    if body.is_empty() {
        return;
    }
    prune_body(body, owner, flags);
}
