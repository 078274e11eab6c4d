// SPDX-FileCopyrightText: © 2025 pyisolate authors

use crate::error::Error;
use ruff_python_ast::{ModModule, Stmt};
use ruff_python_parser::parse_module;

/// A parsed source: either a whole module, or the single definition it
/// consists of. The single-definition form supports isolating one
/// decorated fragment handed over as bare text.
#[derive(Debug)]
pub enum SourceTree {
    Module(ModModule),
    Single(Stmt),
}

impl SourceTree {
    pub fn body(&self) -> &[Stmt] {
        match self {
            SourceTree::Module(module) => &module.body,
            SourceTree::Single(stmt) => std::slice::from_ref(stmt),
        }
    }
}

pub fn parse_source(source: &str) -> Result<SourceTree, Error> {
    let mut module = parse_module(source)?.into_syntax();
    if module.body.len() == 1
        && matches!(module.body[0], Stmt::FunctionDef(_) | Stmt::ClassDef(_))
    {
        return Ok(SourceTree::Single(module.body.pop().unwrap()));
    }
    Ok(SourceTree::Module(module))
}
