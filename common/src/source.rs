// SPDX-FileCopyrightText: © 2025 pyisolate authors

use crate::error::Error;
use log::debug;
use ruff_python_ast::{ExceptHandler, Stmt};
use ruff_python_parser::parse_module;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use ustr::{ustr, Ustr};

/// A resolved Python module: its import path and, when it has one, the
/// file its source lives in. `__main__` and builtins carry no file.
#[derive(Debug, Clone)]
pub struct ModuleHandle {
    pub name: Ustr,
    pub file: Option<PathBuf>,
}

impl ModuleHandle {
    pub fn from_file<P: AsRef<Path>>(path: P) -> ModuleHandle {
        let path = path.as_ref();
        let mut name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();
        if name == "__init__" {
            if let Some(pkg) = path.parent().and_then(|p| p.file_name()).and_then(|s| s.to_str()) {
                name = pkg.to_string();
            }
        }
        ModuleHandle {
            name: ustr(&name),
            file: Some(path.to_path_buf()),
        }
    }

    /// The interactive toplevel; source comes from a session provider.
    pub fn main() -> ModuleHandle {
        ModuleHandle {
            name: ustr("__main__"),
            file: None,
        }
    }

    pub fn builtin(name: &str) -> ModuleHandle {
        ModuleHandle {
            name: ustr(name),
            file: None,
        }
    }
}

/// A definition nominated for extraction. The qualname may be dotted
/// (`C.m`); the head segment names the top-level definition.
#[derive(Debug, Clone)]
pub struct Entry {
    pub module: ModuleHandle,
    pub qualname: String,
}

impl Entry {
    pub fn new(module: ModuleHandle, qualname: &str) -> Entry {
        Entry {
            module,
            qualname: qualname.to_string(),
        }
    }

    pub fn head(&self) -> &str {
        match self.qualname.find('.') {
            Some(idx) => &self.qualname[..idx],
            None => &self.qualname,
        }
    }
}

/// Supplies the ordered input history of an interactive session, used
/// when an entry lives in `__main__`.
pub trait SessionProvider {
    fn fragments(&self) -> Vec<String>;
}

/// Strip the longest common leading whitespace from all non-blank lines,
/// the way `textwrap.dedent` does. Whitespace-only lines are ignored for
/// margin computation and normalized to empty.
pub fn dedent(text: &str) -> String {
    let mut margin: Option<&str> = None;
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        let indent = &line[..line.len() - trimmed.len()];
        margin = Some(match margin {
            None => indent,
            Some(current) => {
                let end = indent
                    .bytes()
                    .zip(current.bytes())
                    .take_while(|(a, b)| a == b)
                    .count();
                &indent[..end]
            }
        });
    }
    let margin = margin.unwrap_or("");
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if line.trim_start().is_empty() {
            out.push('\n');
        } else {
            out.push_str(line.strip_prefix(margin).unwrap_or(line));
            out.push('\n');
        }
    }
    if !text.ends_with('\n') && out.ends_with('\n') {
        out.pop();
    }
    out
}

/// Obtain the full source of the entry's defining module.
///
/// File-backed modules are read and dedented. Entries in `__main__` are
/// reconstructed from session history. Builtins have no source.
pub fn acquire(
    entry: &Entry,
    session: Option<&dyn SessionProvider>,
) -> Result<(String, ModuleHandle), Error> {
    let module = &entry.module;
    if module.name.as_str() == "__main__" {
        let provider = match session {
            Some(p) => p,
            None => return Err(Error::NoSessionSource(entry.qualname.clone())),
        };
        return match session_source(entry.head(), provider) {
            Some(src) => Ok((src, module.clone())),
            None => Err(Error::NoSessionSource(entry.qualname.clone())),
        };
    }
    match &module.file {
        Some(file) => {
            if !file.is_file() {
                return Err(Error::NotLocatable(format!(
                    "{} ({})",
                    entry.qualname,
                    file.display()
                )));
            }
            debug!("reading module {} from {}", module.name, file.display());
            let raw = read_to_string(file)?;
            Ok((dedent(&raw), module.clone()))
        }
        None => Err(Error::BuiltinSource(entry.qualname.clone())),
    }
}

/// Concatenate parseable history fragments, each annotated with a
/// synthetic cell marker. Returns None unless some fragment defines
/// `name`; fragments that fail to parse are skipped.
pub fn session_source(name: &str, provider: &dyn SessionProvider) -> Option<String> {
    let mut defined = false;
    let mut src = String::new();
    for (idx, fragment) in provider.fragments().iter().enumerate() {
        if fragment.trim().is_empty() {
            continue;
        }
        let cell = dedent(fragment);
        if parse_module(&cell).is_err() {
            debug!("skipping unparseable session fragment {}", idx + 1);
            continue;
        }
        src.push_str(&format!("# CellID[{}]\n{}\n", idx + 1, cell));
        if !defined {
            defined = is_defined_in_source(name, &cell);
        }
    }
    if defined {
        Some(src)
    } else {
        None
    }
}

/// Whether `name` is bound in `src` as a definition or an import alias,
/// at any nesting depth. Unparseable source defines nothing.
pub fn is_defined_in_source(name: &str, src: &str) -> bool {
    match parse_module(src) {
        Ok(parsed) => defines(&parsed.syntax().body, name),
        Err(_) => false,
    }
}

fn defines(body: &[Stmt], name: &str) -> bool {
    body.iter().any(|stmt| match stmt {
        Stmt::FunctionDef(d) => d.name.id.as_str() == name || defines(&d.body, name),
        Stmt::ClassDef(d) => d.name.id.as_str() == name || defines(&d.body, name),
        Stmt::Import(imp) => imp.names.iter().any(|alias| {
            alias
                .asname
                .as_ref()
                .map(|n| n.id.as_str())
                .unwrap_or(alias.name.id.as_str())
                == name
        }),
        Stmt::ImportFrom(imp) => imp.names.iter().any(|alias| {
            alias
                .asname
                .as_ref()
                .map(|n| n.id.as_str())
                .unwrap_or(alias.name.id.as_str())
                == name
        }),
        Stmt::If(i) => {
            defines(&i.body, name)
                || i.elif_else_clauses.iter().any(|c| defines(&c.body, name))
        }
        Stmt::For(f) => defines(&f.body, name) || defines(&f.orelse, name),
        Stmt::While(w) => defines(&w.body, name) || defines(&w.orelse, name),
        Stmt::With(w) => defines(&w.body, name),
        Stmt::Try(t) => {
            defines(&t.body, name)
                || defines(&t.orelse, name)
                || defines(&t.finalbody, name)
                || t.handlers.iter().any(|h| {
                    let ExceptHandler::ExceptHandler(h) = h;
                    defines(&h.body, name)
                })
        }
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSession(Vec<&'static str>);

    impl SessionProvider for FixedSession {
        fn fragments(&self) -> Vec<String> {
            self.0.iter().map(|s| s.to_string()).collect()
        }
    }

    #[test]
    fn dedent_strips_common_margin() {
        let src = "    def f():\n        return 1\n";
        assert_eq!(dedent(src), "def f():\n    return 1\n");
    }

    #[test]
    fn dedent_ignores_blank_lines() {
        let src = "  a = 1\n\n  b = 2\n";
        assert_eq!(dedent(src), "a = 1\n\nb = 2\n");
    }

    #[test]
    fn dedent_keeps_unindented_text() {
        let src = "a = 1\n  b = 2\n";
        assert_eq!(dedent(src), src);
    }

    #[test]
    fn defined_as_def_class_or_alias() {
        let src = "import math\nfrom os import path as ospath\n\ndef f():\n    pass\n\nclass K:\n    pass\n";
        assert!(is_defined_in_source("f", src));
        assert!(is_defined_in_source("K", src));
        assert!(is_defined_in_source("math", src));
        assert!(is_defined_in_source("ospath", src));
        assert!(!is_defined_in_source("nope", src));
    }

    #[test]
    fn defined_inside_nested_body() {
        let src = "if True:\n    def g():\n        pass\n";
        assert!(is_defined_in_source("g", src));
    }

    #[test]
    fn session_source_annotates_cells_and_skips_broken_ones() {
        let session = FixedSession(vec!["x = 1", "def broken(:", "def target():\n    return x"]);
        let src = session_source("target", &session).expect("entry is defined in history");
        assert!(src.contains("# CellID[1]\nx = 1\n"));
        assert!(!src.contains("broken"));
        assert!(src.contains("# CellID[3]\ndef target():\n    return x\n"));
    }

    #[test]
    fn session_source_requires_definition() {
        let session = FixedSession(vec!["x = 1"]);
        assert!(session_source("target", &session).is_none());
    }

    #[test]
    fn acquire_main_without_session_fails() {
        let entry = Entry::new(ModuleHandle::main(), "f");
        match acquire(&entry, None) {
            Err(Error::NoSessionSource(_)) => {}
            other => panic!("expected NoSessionSource, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn acquire_builtin_fails() {
        let entry = Entry::new(ModuleHandle::builtin("builtins"), "print");
        match acquire(&entry, None) {
            Err(Error::BuiltinSource(_)) => {}
            other => panic!("expected BuiltinSource, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn entry_head_splits_qualname() {
        let entry = Entry::new(ModuleHandle::main(), "C.m");
        assert_eq!(entry.head(), "C");
        let entry = Entry::new(ModuleHandle::main(), "f");
        assert_eq!(entry.head(), "f");
    }

    #[test]
    fn module_handle_names_from_paths() {
        assert_eq!(ModuleHandle::from_file("/x/pkg/mod.py").name.as_str(), "mod");
        assert_eq!(
            ModuleHandle::from_file("/x/pkg/__init__.py").name.as_str(),
            "pkg"
        );
    }
}
