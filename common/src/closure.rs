// SPDX-FileCopyrightText: © 2025 pyisolate authors

use crate::defs::{DefItem, PruneFlags, VarsItem};
use crate::error::Error;
use crate::imports::ImportItem;
use crate::index::{Binding, ModuleIndex};
use crate::parser::parse_source;
use crate::pyenv::{ModuleCategory, RuntimeEnv};
use crate::source::{acquire, Entry, SessionProvider};
use crate::usage::NameSet;
use log::{debug, info};
use std::collections::{BTreeMap, HashSet, VecDeque};
use ustr::{ustr, Ustr};

/// Everything the closure reached, grouped the way the renderer consumes
/// it. Orders are first-discovery and stable.
#[derive(Debug, Default)]
pub struct Report {
    /// module name -> (alias, import item)
    pub imports: BTreeMap<String, Vec<(Ustr, ImportItem)>>,
    /// module name -> variables in discovery order
    pub vars: BTreeMap<String, Vec<VarsItem>>,
    pub def_items: Vec<DefItem>,
    /// names the closure could not bind, in discovery order
    pub unbound: Vec<Ustr>,
    /// annotation-only names -> alias, rendered under TYPE_CHECKING
    pub typehints: Vec<(Ustr, Ustr)>,
}

/// Resolves entries to their defining modules and closes over every
/// sibling definition, variable, and import they transitively touch.
pub struct Analyzer {
    env: RuntimeEnv,
    session: Option<Box<dyn SessionProvider>>,
    flags: PruneFlags,
    /// pull a dynamic import's own callee names into the closure; off
    /// when the renderer is going to drop the dynamic lines anyway
    expand_dynamic: bool,
}

impl Analyzer {
    pub fn new(env: RuntimeEnv) -> Analyzer {
        Analyzer {
            env,
            session: None,
            flags: PruneFlags::default(),
            expand_dynamic: true,
        }
    }

    pub fn with_session(mut self, session: Box<dyn SessionProvider>) -> Analyzer {
        self.session = Some(session);
        self
    }

    pub fn with_flags(mut self, flags: PruneFlags) -> Analyzer {
        self.flags = flags;
        self
    }

    pub fn with_dynamic_expansion(mut self, expand: bool) -> Analyzer {
        self.expand_dynamic = expand;
        self
    }

    pub fn env(&self) -> &RuntimeEnv {
        &self.env
    }

    pub fn analyze(&self, entry: &Entry) -> Result<Report, Error> {
        self.analyze_many(std::slice::from_ref(entry))
    }

    pub fn analyze_many(&self, entries: &[Entry]) -> Result<Report, Error> {
        let mut report = Report::default();
        for (module_name, group) in group_by_module(entries) {
            debug!("analyzing {} entries in module {}", group.len(), module_name);
            self.analyze_module(&mut report, &group)?;
        }
        Ok(report)
    }

    fn analyze_module(&self, report: &mut Report, entries: &[&Entry]) -> Result<(), Error> {
        let first = entries[0];
        let session = self.session.as_deref();
        let (source, module) = acquire(first, session)?;
        let category = self.env.classify(&module, session.is_some());
        if matches!(
            category,
            ModuleCategory::Stdlib
                | ModuleCategory::Thirdparty
                | ModuleCategory::Builtin
                | ModuleCategory::Extension
        ) {
            return Err(Error::ExternalEntry {
                name: first.qualname.clone(),
                category,
            });
        }
        let tree = parse_source(&source)?;
        let index = ModuleIndex::build(&source, module, &tree, &self.env, self.flags);
        let mut heads = Vec::with_capacity(entries.len());
        for entry in entries {
            let head = ustr(entry.head());
            match index.binding(head) {
                Some(Binding::Def(_)) => heads.push(head),
                _ => return Err(Error::NotLocatable(entry.qualname.clone())),
            }
        }
        self.close_into(report, &index, &heads);
        Ok(())
    }

    fn close_into(&self, report: &mut Report, index: &ModuleIndex, entries: &[Ustr]) {
        let mut queue: VecDeque<Ustr> = entries.iter().copied().collect();
        let mut seen: HashSet<Ustr> = HashSet::new();

        let mut reached_imports: Vec<usize> = Vec::new();
        let mut reached_vars: Vec<usize> = Vec::new();
        let mut reached_defs: Vec<usize> = Vec::new();
        let mut import_seen: HashSet<usize> = HashSet::new();
        let mut var_seen: HashSet<usize> = HashSet::new();
        let mut def_seen: HashSet<usize> = HashSet::new();
        let mut unbound = NameSet::default();
        let mut type_candidates = NameSet::default();
        let mut processed_types: HashSet<Ustr> = HashSet::new();
        let mut typehints: Vec<(Ustr, Ustr)> = Vec::new();
        let mut stars_pulled = false;

        loop {
            while let Some(name) = queue.pop_front() {
                if !seen.insert(name) {
                    continue;
                }
                if self.env.is_builtin_name(name.as_str()) {
                    continue;
                }
                match index.binding(name) {
                    Some(Binding::Import(i)) => {
                        if import_seen.insert(i) {
                            reached_imports.push(i);
                            let item = &index.imports[i];
                            // static imports are leaves; a dynamic one
                            // still reads its callee
                            if item.is_dynamic && self.expand_dynamic {
                                queue.extend(item.free_names.iter().copied());
                            }
                        }
                    }
                    Some(Binding::Var(i)) => {
                        if var_seen.insert(i) {
                            reached_vars.push(i);
                            let var = &index.vars[i];
                            queue.extend(var.free_names.iter().copied());
                            for t in &var.type_refs {
                                type_candidates.insert(*t);
                            }
                        }
                    }
                    Some(Binding::Def(i)) => {
                        if def_seen.insert(i) {
                            reached_defs.push(i);
                            let def = &index.defs[i];
                            queue.extend(def.free_names.iter().copied());
                            for t in &def.type_refs {
                                type_candidates.insert(*t);
                            }
                        }
                    }
                    None => {
                        if index.has_star_imports() {
                            // the name may come from a wildcard; keep
                            // every star import and treat it as bound
                            if !stars_pulled {
                                for &si in index.star_imports() {
                                    if import_seen.insert(si) {
                                        reached_imports.push(si);
                                    }
                                }
                                stars_pulled = true;
                            }
                        } else {
                            unbound.insert(name);
                        }
                    }
                }
            }

            // names used only in annotations: route typing imports and
            // unknowns to the TYPE_CHECKING block, everything else back
            // into the main worklist
            let next = type_candidates
                .as_slice()
                .iter()
                .copied()
                .find(|t| !processed_types.contains(t));
            let Some(t) = next else {
                break;
            };
            processed_types.insert(t);
            if seen.contains(&t) || self.env.is_builtin_name(t.as_str()) {
                continue;
            }
            match index.binding(t) {
                Some(Binding::Import(i)) => {
                    let item = &index.imports[i];
                    let original = item
                        .names
                        .iter()
                        .find(|(alias, _)| *alias == t)
                        .map(|(_, name)| *name)
                        .unwrap_or(t);
                    // `from typing import X [as y]` only; a plain
                    // `import typing` stays a runtime import
                    if !item.is_dynamic
                        && item.module.map(|m| m.as_str() == "typing") == Some(true)
                        && original.as_str() != "typing"
                    {
                        typehints.push((original, t));
                    } else {
                        queue.push_back(t);
                    }
                }
                None => typehints.push((t, t)),
                Some(_) => queue.push_back(t),
            }
        }

        // a name first seen in annotations can turn out to be a runtime
        // dependency of something reached later
        typehints.retain(|(_, alias)| !seen.contains(alias));

        info!(
            "closure over {}: {} defs, {} vars, {} imports, {} unbound",
            index.module.name,
            reached_defs.len(),
            reached_vars.len(),
            reached_imports.len(),
            unbound.len()
        );

        let module_name = index.module.name.to_string();
        if !reached_imports.is_empty() {
            let slot = report.imports.entry(module_name.clone()).or_default();
            for &i in &reached_imports {
                let item = &index.imports[i];
                for (alias, _) in &item.names {
                    slot.push((*alias, item.clone()));
                }
            }
        }
        if !reached_vars.is_empty() {
            let slot = report.vars.entry(module_name).or_default();
            for &i in &reached_vars {
                slot.push(index.vars[i].clone());
            }
        }
        for &i in &reached_defs {
            report.def_items.push(index.defs[i].clone());
        }
        for name in unbound.as_slice() {
            if !report.unbound.contains(name) {
                report.unbound.push(*name);
            }
        }
        for (name, alias) in typehints {
            if !report.typehints.iter().any(|(_, a)| *a == alias) {
                report.typehints.push((name, alias));
            }
        }
    }
}

fn group_by_module<'e>(entries: &'e [Entry]) -> Vec<(Ustr, Vec<&'e Entry>)> {
    let mut groups: Vec<(Ustr, Vec<&Entry>)> = Vec::new();
    for entry in entries {
        match groups.iter_mut().find(|(name, _)| *name == entry.module.name) {
            Some((_, group)) => group.push(entry),
            None => groups.push((entry.module.name, vec![entry])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ModuleHandle;
    use std::fs;
    use std::path::PathBuf;

    struct TempModule(PathBuf);

    impl TempModule {
        fn new(tag: &str, source: &str) -> TempModule {
            let path = std::env::temp_dir().join(format!(
                "pyisolate-closure-{}-{}.py",
                tag,
                std::process::id()
            ));
            fs::write(&path, source).unwrap();
            TempModule(path)
        }

        fn entry(&self, qualname: &str) -> Entry {
            Entry::new(ModuleHandle::from_file(&self.0), qualname)
        }
    }

    impl Drop for TempModule {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.0);
        }
    }

    fn analyzer() -> Analyzer {
        Analyzer::new(RuntimeEnv::empty())
    }

    #[test]
    fn bare_name_var_pulls_function() {
        let module = TempModule::new(
            "varpull",
            "def f():\n    return 1\n\nLOCAL = f\n\ndef entry():\n    return LOCAL()\n",
        );
        let report = analyzer().analyze(&module.entry("entry")).unwrap();
        let names: Vec<&str> = report.def_items.iter().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"entry"));
        assert!(names.contains(&"f"));
        let vars = report.vars.values().next().unwrap();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].name.as_str(), "LOCAL");
        assert!(report.imports.is_empty());
        assert!(report.unbound.is_empty());
    }

    #[test]
    fn builtins_are_not_unbound() {
        let module = TempModule::new(
            "builtins",
            "def entry(xs):\n    return [print(len(x)) for x in xs]\n",
        );
        let report = analyzer().analyze(&module.entry("entry")).unwrap();
        assert!(report.unbound.is_empty());
        assert!(report.imports.is_empty());
        assert_eq!(report.def_items.len(), 1);
    }

    #[test]
    fn unresolved_names_are_reported() {
        let module = TempModule::new(
            "unbound",
            "def k():\n    return not_defined_anywhere()\n",
        );
        let report = analyzer().analyze(&module.entry("k")).unwrap();
        let unbound: Vec<&str> = report.unbound.iter().map(|u| u.as_str()).collect();
        assert_eq!(unbound, vec!["not_defined_anywhere"]);
        assert_eq!(report.def_items.len(), 1);
    }

    #[test]
    fn imports_are_leaves() {
        let module = TempModule::new(
            "leaves",
            "import textwrap as _tw\n\ndef g(s):\n    return _tw.dedent(s)\n",
        );
        let report = analyzer().analyze(&module.entry("g")).unwrap();
        let imports = report.imports.values().next().unwrap();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].0.as_str(), "_tw");
        assert!(report.unbound.is_empty());
    }

    #[test]
    fn dynamic_import_pulls_its_machinery() {
        let module = TempModule::new(
            "dynamic",
            "import importlib\n_json = importlib.import_module('json')\n\ndef h(x):\n    return _json.dumps(x)\n",
        );
        let report = analyzer().analyze(&module.entry("h")).unwrap();
        let imports = report.imports.values().next().unwrap();
        let aliases: Vec<&str> = imports.iter().map(|(a, _)| a.as_str()).collect();
        assert!(aliases.contains(&"_json"));
        assert!(aliases.contains(&"importlib"));
        let dynamic = imports.iter().find(|(a, _)| a.as_str() == "_json").unwrap();
        assert!(dynamic.1.is_dynamic);
        assert_eq!(dynamic.1.module.unwrap().as_str(), "json");
    }

    #[test]
    fn cycles_terminate() {
        let module = TempModule::new(
            "cycle",
            "def even(n):\n    return n == 0 or odd(n - 1)\n\ndef odd(n):\n    return n != 0 and even(n - 1)\n",
        );
        let report = analyzer().analyze(&module.entry("even")).unwrap();
        assert_eq!(report.def_items.len(), 2);
        assert!(report.unbound.is_empty());
    }

    #[test]
    fn star_imports_bind_unknown_names() {
        let module = TempModule::new(
            "stars",
            "from math import *\n\ndef area(r):\n    return pi * r * r\n",
        );
        let report = analyzer().analyze(&module.entry("area")).unwrap();
        assert!(report.unbound.is_empty());
        let imports = report.imports.values().next().unwrap();
        assert!(imports[0].1.use_star);
        assert_eq!(imports[0].0.as_str(), "*_math");
    }

    #[test]
    fn shadowed_import_is_not_pulled() {
        let module = TempModule::new(
            "shadow",
            "import json\njson = None\n\ndef entry():\n    return json\n",
        );
        let report = analyzer().analyze(&module.entry("entry")).unwrap();
        assert!(report.imports.is_empty());
        let vars = report.vars.values().next().unwrap();
        assert_eq!(vars[0].name.as_str(), "json");
    }

    #[test]
    fn typing_annotations_become_typehints() {
        let module = TempModule::new(
            "hints",
            "from typing import Mapping as Map\n\ndef entry(d: Map) -> None:\n    return None\n",
        );
        let report = analyzer().analyze(&module.entry("entry")).unwrap();
        assert!(report.imports.is_empty());
        assert_eq!(report.typehints.len(), 1);
        assert_eq!(report.typehints[0].0.as_str(), "Mapping");
        assert_eq!(report.typehints[0].1.as_str(), "Map");
    }

    #[test]
    fn runtime_use_keeps_typing_import() {
        let module = TempModule::new(
            "hints-runtime",
            "from typing import NamedTuple\n\nclass P(NamedTuple):\n    x: int\n",
        );
        let report = analyzer().analyze(&module.entry("P")).unwrap();
        assert!(report.typehints.is_empty());
        let imports = report.imports.values().next().unwrap();
        assert_eq!(imports[0].0.as_str(), "NamedTuple");
    }

    #[test]
    fn annotation_only_sibling_defs_resolve_at_runtime() {
        let module = TempModule::new(
            "hints-sibling",
            "class Helper:\n    pass\n\ndef entry(h: Helper) -> int:\n    return 1\n",
        );
        let report = analyzer().analyze(&module.entry("entry")).unwrap();
        // a sibling class is a real definition, not a typing alias
        let names: Vec<&str> = report.def_items.iter().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"Helper"));
        assert!(report.typehints.is_empty());
    }

    #[test]
    fn unknown_annotation_names_become_typehints() {
        let module = TempModule::new(
            "hints-unknown",
            "def entry(x: Unseen) -> None:\n    return None\n",
        );
        let report = analyzer().analyze(&module.entry("entry")).unwrap();
        assert_eq!(report.typehints.len(), 1);
        assert_eq!(report.typehints[0].0.as_str(), "Unseen");
        assert!(report.unbound.is_empty());
    }

    #[test]
    fn method_entry_resolves_to_class() {
        let module = TempModule::new(
            "method",
            "class C:\n    def m(self, x):\n        return x\n",
        );
        let report = analyzer().analyze(&module.entry("C.m")).unwrap();
        assert_eq!(report.def_items.len(), 1);
        assert_eq!(report.def_items[0].name.as_str(), "C");
    }

    #[test]
    fn missing_entries_are_not_locatable() {
        let module = TempModule::new("missing", "def f():\n    return 1\n");
        match analyzer().analyze(&module.entry("nope")) {
            Err(Error::NotLocatable(name)) => assert_eq!(name, "nope"),
            other => panic!("expected NotLocatable, got {:?}", other),
        }
    }

    #[test]
    fn stdlib_entries_are_rejected() {
        let module = TempModule::new("external", "def dedent(s):\n    return s\n");
        // pretend the module file lives under the stdlib path
        let mut env = RuntimeEnv::empty();
        env.stdlib_paths.push(std::env::temp_dir());
        let mut handle = ModuleHandle::from_file(&module.0);
        handle.name = ustr("textwrap");
        let entry = Entry::new(handle, "dedent");
        match Analyzer::new(env).analyze(&entry) {
            Err(Error::ExternalEntry { category, .. }) => {
                assert_eq!(category, ModuleCategory::Stdlib)
            }
            other => panic!("expected ExternalEntry, got {:?}", other),
        }
    }

    #[test]
    fn analyze_many_merges_and_dedupes() {
        let module = TempModule::new(
            "many",
            "SHARED = 1\n\ndef a():\n    return SHARED\n\ndef b():\n    return SHARED\n",
        );
        let report = analyzer()
            .analyze_many(&[module.entry("a"), module.entry("b")])
            .unwrap();
        assert_eq!(report.def_items.len(), 2);
        let vars = report.vars.values().next().unwrap();
        assert_eq!(vars.len(), 1);
    }
}
