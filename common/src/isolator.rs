// SPDX-FileCopyrightText: © 2025 pyisolate authors

use crate::closure::{Analyzer, Report};
use crate::defs::{DefItem, DefKind, PruneFlags};
use crate::error::Error;
use crate::pyenv::{HttpPypiOracle, PypiOracle, RuntimeEnv};
use crate::source::{Entry, SessionProvider};
use log::debug;
use ruff_python_codegen::{Generator, Indentation};
use ruff_source_file::LineEnding;
use std::collections::{BTreeSet, HashMap, HashSet};
use ustr::Ustr;

#[derive(Debug, Clone, Copy)]
pub struct IsolateOptions {
    pub sort_imports: bool,
    pub keep_dynamic_imports: bool,
    pub collapse_inner_functions: bool,
    pub collapse_methods: bool,
}

impl Default for IsolateOptions {
    fn default() -> Self {
        IsolateOptions {
            sort_imports: true,
            keep_dynamic_imports: true,
            collapse_inner_functions: true,
            collapse_methods: true,
        }
    }
}

/// What `isolate` hands back: a runnable slice plus everything the
/// caller needs to reproduce its environment.
#[derive(Debug)]
pub struct IsolateBundle {
    /// rendered source, exactly one trailing newline
    pub source: String,
    pub warnings: Vec<String>,
    /// distributions confirmed on the index, sorted
    pub reqs_pypi: Vec<String>,
    /// non-stdlib distributions the index does not know, sorted
    pub reqs_unknown: Vec<String>,
    /// names the closure could not bind, sorted
    pub unbound: Vec<String>,
}

/// Renders minimal, self-contained source for the nominated entries.
pub struct Isolator {
    analyzer: Analyzer,
    oracle: Box<dyn PypiOracle>,
    sort_imports: bool,
    keep_dynamic_imports: bool,
}

impl Isolator {
    pub fn new(env: RuntimeEnv, options: IsolateOptions) -> Isolator {
        Isolator {
            analyzer: Analyzer::new(env)
                .with_flags(PruneFlags {
                    collapse_inner_functions: options.collapse_inner_functions,
                    collapse_methods: options.collapse_methods,
                })
                .with_dynamic_expansion(options.keep_dynamic_imports),
            oracle: Box::new(HttpPypiOracle::new()),
            sort_imports: options.sort_imports,
            keep_dynamic_imports: options.keep_dynamic_imports,
        }
    }

    pub fn with_oracle(mut self, oracle: Box<dyn PypiOracle>) -> Isolator {
        self.oracle = oracle;
        self
    }

    pub fn with_session(mut self, session: Box<dyn SessionProvider>) -> Isolator {
        self.analyzer = self.analyzer.with_session(session);
        self
    }

    pub fn isolate(&self, entries: &[Entry]) -> Result<IsolateBundle, Error> {
        let report = self.analyzer.analyze_many(entries)?;
        Ok(self.isolate_from_report(&report))
    }

    pub fn isolate_from_report(&self, report: &Report) -> IsolateBundle {
        let mut sections: Vec<String> = Vec::new();

        let import_lines = self.import_lines(report);
        if !import_lines.is_empty() {
            sections.push(import_lines.join("\n"));
        }
        let var_lines = var_lines(report);
        if !var_lines.is_empty() {
            sections.push(var_lines.join("\n"));
        }
        let def_blocks = def_blocks(&report.def_items);
        if !def_blocks.is_empty() {
            sections.push(def_blocks.join("\n\n\n"));
        }

        let mut source = sections.join("\n\n");
        source.truncate(source.trim_end().len());
        source.push('\n');

        let mut unbound: Vec<String> = report.unbound.iter().map(|u| u.to_string()).collect();
        unbound.sort();
        unbound.dedup();
        let warnings = collect_warnings(&unbound);
        let (reqs_pypi, reqs_unknown) = self.requirements(report);

        IsolateBundle {
            source,
            warnings,
            reqs_pypi,
            reqs_unknown,
            unbound,
        }
    }

    fn import_lines(&self, report: &Report) -> Vec<String> {
        let mut items: Vec<_> = report
            .imports
            .values()
            .flat_map(|aliases| aliases.iter().map(|(_, item)| item))
            .collect();
        if self.sort_imports {
            items.sort_by(|a, b| {
                let ka = (
                    a.is_dynamic,
                    a.module.map(|m| m.as_str()).unwrap_or(""),
                    a.code.as_str(),
                );
                let kb = (
                    b.is_dynamic,
                    b.module.map(|m| m.as_str()).unwrap_or(""),
                    b.code.as_str(),
                );
                ka.cmp(&kb)
            });
        }
        let mut seen: HashSet<&str> = HashSet::new();
        let mut lines: Vec<String> = Vec::new();
        for item in items {
            if item.is_dynamic && !self.keep_dynamic_imports {
                continue;
            }
            let line = item.code.trim_end();
            if !line.is_empty() && seen.insert(line) {
                lines.push(line.to_string());
            }
        }
        if !report.typehints.is_empty() {
            let hints: Vec<String> = report
                .typehints
                .iter()
                .map(|(name, alias)| {
                    if name == alias {
                        name.to_string()
                    } else {
                        format!("{} as {}", name, alias)
                    }
                })
                .collect();
            // one contiguous header block, ahead of the regular imports
            let mut block = vec![
                "from __future__ import annotations".to_string(),
                "from typing import TYPE_CHECKING".to_string(),
                "if TYPE_CHECKING:".to_string(),
                format!("    from typing import {}", hints.join(", ")),
            ];
            block.extend(lines);
            return block;
        }
        lines
    }

    fn requirements(&self, report: &Report) -> (Vec<String>, Vec<String>) {
        let mut on_pypi: BTreeSet<String> = BTreeSet::new();
        let mut unknown: BTreeSet<String> = BTreeSet::new();
        let mut probed: HashMap<Ustr, bool> = HashMap::new();
        for item in report.imports.values().flatten().map(|(_, item)| item) {
            let Some(pkg) = item.package_name else {
                continue;
            };
            if self.analyzer.env().is_stdlib(pkg.as_str()) {
                continue;
            }
            let hit = *probed
                .entry(pkg)
                .or_insert_with(|| self.oracle.on_pypi(pkg.as_str()));
            debug!("requirement {}: on_pypi={}", pkg, hit);
            if hit {
                on_pypi.insert(pkg.to_string());
            } else {
                unknown.insert(pkg.to_string());
            }
        }
        (
            on_pypi.into_iter().collect(),
            unknown.into_iter().collect(),
        )
    }
}

fn var_lines(report: &Report) -> Vec<String> {
    let mut lines = Vec::new();
    for vars in report.vars.values() {
        for var in vars {
            let code = var.code.trim_end();
            if !code.is_empty() {
                lines.push(code.to_string());
            }
        }
    }
    lines
}

fn def_blocks(def_items: &[DefItem]) -> Vec<String> {
    let classes = def_items.iter().filter(|d| d.kind == DefKind::Class);
    let functions = def_items.iter().filter(|d| d.kind != DefKind::Class);
    classes.chain(functions).map(render_def).collect()
}

/// Prefer the structural unparse of the pruned tree; the captured source
/// cannot reflect pruning. The textual fallbacks only guard degenerate
/// unparse output.
fn render_def(item: &DefItem) -> String {
    let indent = Indentation::default();
    let text = Generator::new(&indent, Quote::default(), LineEnding::Lf).stmt(&item.pruned);
    let text = text.trim_end();
    if !text.is_empty() {
        return text.to_string();
    }
    let code = item.code.trim();
    if !code.is_empty() {
        return code.to_string();
    }
    "# <unparseable definition>".to_string()
}

fn collect_warnings(unbound: &[String]) -> Vec<String> {
    if unbound.is_empty() {
        return Vec::new();
    }
    let message = format!(
        "Unresolved names detected. These may need to be provided at runtime or via stub definitions:\n - {}",
        unbound.join("\n - ")
    );
    eprintln!("{}", message);
    vec![message]
}
