// SPDX-FileCopyrightText: © 2025 pyisolate authors

use crate::source::ModuleHandle;
use anyhow::Context;
use log::{debug, warn};
use ruff_python_stdlib::builtins::is_python_builtin;
use ruff_python_stdlib::sys::is_known_standard_library;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use ustr::{ustr, Ustr};
use walkdir::WalkDir;

/// Assumed interpreter version when none was probed.
pub const DEFAULT_PYTHON_MINOR: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleCategory {
    Stdlib,
    Builtin,
    Thirdparty,
    Extension,
    Local,
    Unknown,
}

impl Display for ModuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModuleCategory::Stdlib => "stdlib",
            ModuleCategory::Builtin => "builtin",
            ModuleCategory::Thirdparty => "thirdparty",
            ModuleCategory::Extension => "extension",
            ModuleCategory::Local => "local",
            ModuleCategory::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Immutable snapshot of installed top-level module -> distribution name,
/// built once from the metadata directories under site-packages.
#[derive(Debug, Default, Clone)]
pub struct DistMap {
    map: HashMap<Ustr, Ustr>,
}

impl DistMap {
    pub fn empty() -> DistMap {
        DistMap::default()
    }

    pub fn scan(site_packages: &[PathBuf]) -> DistMap {
        let mut dists = DistMap::default();
        for root in site_packages {
            for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
                let entry = match entry {
                    Ok(e) => e,
                    Err(err) => {
                        warn!("skipping unreadable site-packages entry: {}", err);
                        continue;
                    }
                };
                let name = entry.file_name().to_str().unwrap_or("");
                if entry.file_type().is_dir()
                    && (name.ends_with(".dist-info") || name.ends_with(".egg-info"))
                {
                    dists.read_metadata_dir(entry.path());
                }
            }
        }
        debug!("distribution map covers {} top-level modules", dists.map.len());
        dists
    }

    pub fn get(&self, top: &str) -> Option<Ustr> {
        self.map.get(&ustr(top)).copied()
    }

    /// Host override hook: pin a top-level module to a distribution.
    pub fn insert(&mut self, top: &str, dist: &str) {
        self.map.insert(ustr(top), ustr(dist));
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn read_metadata_dir(&mut self, info_dir: &Path) {
        let dist = dist_name_of(info_dir);
        let mut tops = toplevel_from_manifest(info_dir);
        if tops.is_empty() {
            tops = toplevel_from_record(info_dir);
        }
        for top in tops {
            self.map.insert(ustr(&top), ustr(&dist));
        }
    }
}

fn dist_name_of(info_dir: &Path) -> String {
    for candidate in ["METADATA", "PKG-INFO"] {
        if let Ok(text) = read_to_string(info_dir.join(candidate)) {
            for line in text.lines() {
                if let Some(name) = line.strip_prefix("Name: ") {
                    return name.trim().to_string();
                }
                // metadata headers end at the first blank line
                if line.is_empty() {
                    break;
                }
            }
        }
    }
    let dir = info_dir
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .trim_end_matches(".dist-info")
        .trim_end_matches(".egg-info");
    match dir.split_once('-') {
        Some((name, _version)) => name.to_string(),
        None => dir.to_string(),
    }
}

fn toplevel_from_manifest(info_dir: &Path) -> Vec<String> {
    let Ok(text) = read_to_string(info_dir.join("top_level.txt")) else {
        return Vec::new();
    };
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('_'))
        .map(str::to_string)
        .collect()
}

fn toplevel_from_record(info_dir: &Path) -> Vec<String> {
    let Ok(text) = read_to_string(info_dir.join("RECORD")) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut tops = Vec::new();
    for line in text.lines() {
        let path = line.split(',').next().unwrap_or("").trim();
        if path.is_empty() {
            continue;
        }
        let first = path.split('/').next().unwrap_or(path);
        if first.contains(".dist-info") || first.contains(".egg-info") {
            continue;
        }
        let module = if first.ends_with(".py") && !path.contains('/') {
            &first[..first.len() - 3]
        } else if first.contains('.') {
            // dotted components indicate namespace-package debris
            continue;
        } else {
            first
        };
        if !module.is_empty() && seen.insert(module.to_string()) {
            tops.push(module.to_string());
        }
    }
    tops
}

/// Read-only description of the host Python installation. Built once;
/// `rebuild_dists` is the explicit invalidation entry point.
#[derive(Debug, Clone)]
pub struct RuntimeEnv {
    pub python_minor: u8,
    pub stdlib_paths: Vec<PathBuf>,
    pub site_packages: Vec<PathBuf>,
    pub dists: DistMap,
}

impl Default for RuntimeEnv {
    fn default() -> Self {
        Self::empty()
    }
}

const PROBE: &str = "\
import sys, sysconfig
print('minor:%d' % sys.version_info[1])
paths = sysconfig.get_paths()
print('stdlib:' + paths['stdlib'])
print('stdlib:' + paths.get('platstdlib', paths['stdlib']))
print('site:' + paths['purelib'])
print('site:' + paths['platlib'])
try:
    import site
    for p in site.getsitepackages():
        print('site:' + p)
except Exception:
    pass
";

impl RuntimeEnv {
    /// A hermetic environment: static stdlib table only, no paths, no
    /// installed distributions.
    pub fn empty() -> RuntimeEnv {
        RuntimeEnv {
            python_minor: DEFAULT_PYTHON_MINOR,
            stdlib_paths: Vec::new(),
            site_packages: Vec::new(),
            dists: DistMap::empty(),
        }
    }

    /// Probe a real interpreter for its version and search paths, then
    /// snapshot its installed distributions.
    pub fn from_interpreter(exe: &str) -> Result<RuntimeEnv, anyhow::Error> {
        let out = Command::new(exe)
            .arg("-c")
            .arg(PROBE)
            .output()
            .with_context(|| format!("failed to run {}", exe))?;
        if !out.status.success() {
            anyhow::bail!(
                "{} exited with {}: {}",
                exe,
                out.status,
                String::from_utf8_lossy(&out.stderr)
            );
        }
        let stdout = String::from_utf8_lossy(&out.stdout);
        let mut env = RuntimeEnv::empty();
        for line in stdout.lines() {
            if let Some(minor) = line.strip_prefix("minor:") {
                env.python_minor = minor
                    .trim()
                    .parse()
                    .with_context(|| format!("bad version line from {}: {}", exe, line))?;
            } else if let Some(path) = line.strip_prefix("stdlib:") {
                push_unique(&mut env.stdlib_paths, path);
            } else if let Some(path) = line.strip_prefix("site:") {
                push_unique(&mut env.site_packages, path);
            }
        }
        env.rebuild_dists();
        Ok(env)
    }

    pub fn rebuild_dists(&mut self) {
        self.dists = DistMap::scan(&self.site_packages);
    }

    pub fn is_stdlib(&self, module: &str) -> bool {
        let top = match module.find('.') {
            Some(idx) => &module[..idx],
            None => module,
        };
        is_known_standard_library(self.python_minor, top)
    }

    pub fn is_builtin_name(&self, name: &str) -> bool {
        is_python_builtin(name, self.python_minor, false)
    }

    pub fn classify(&self, module: &ModuleHandle, interactive: bool) -> ModuleCategory {
        let name = module.name.as_str();
        if name.is_empty() {
            return ModuleCategory::Unknown;
        }
        if name == "__main__" && interactive {
            return ModuleCategory::Local;
        }
        if name == "builtins" {
            return ModuleCategory::Builtin;
        }
        if self.is_stdlib(name) {
            return ModuleCategory::Stdlib;
        }
        let Some(file) = &module.file else {
            return ModuleCategory::Builtin;
        };
        let top = match name.find('.') {
            Some(idx) => &name[..idx],
            None => name,
        };
        if self.site_packages.iter().any(|p| file.starts_with(p)) {
            // many interpreter builds ship pip alongside the stdlib
            if top == "pip" {
                return ModuleCategory::Stdlib;
            }
            return ModuleCategory::Thirdparty;
        }
        if self.stdlib_paths.iter().any(|p| file.starts_with(p)) {
            return ModuleCategory::Stdlib;
        }
        match file.extension().and_then(|e| e.to_str()) {
            Some("so") | Some("pyd") | Some("dll") | Some("dylib") => ModuleCategory::Extension,
            _ => ModuleCategory::Local,
        }
    }
}

fn push_unique(paths: &mut Vec<PathBuf>, path: &str) {
    let path = PathBuf::from(path.trim());
    if !path.as_os_str().is_empty() && !paths.contains(&path) {
        paths.push(path);
    }
}

/// `on_pypi(name)`: does a distribution with this name exist on the
/// public index? Probes are best-effort; every failure means "no".
pub trait PypiOracle {
    fn on_pypi(&self, name: &str) -> bool;
}

pub struct HttpPypiOracle {
    agent: ureq::Agent,
}

impl HttpPypiOracle {
    pub fn new() -> HttpPypiOracle {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(5)))
            .build();
        HttpPypiOracle {
            agent: config.new_agent(),
        }
    }
}

impl Default for HttpPypiOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl PypiOracle for HttpPypiOracle {
    fn on_pypi(&self, name: &str) -> bool {
        let url = format!("https://pypi.org/pypi/{}/json", name);
        match self.agent.get(url.as_str()).call() {
            Ok(resp) => resp.status().as_u16() == 200,
            Err(err) => {
                debug!("pypi probe failed for {}: {}", name, err);
                false
            }
        }
    }
}

/// For `--offline` runs and tests: nothing is on the index.
pub struct OfflineOracle;

impl PypiOracle for OfflineOracle {
    fn on_pypi(&self, _name: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct TempTree(PathBuf);

    impl TempTree {
        fn new(tag: &str) -> TempTree {
            let dir = std::env::temp_dir().join(format!(
                "pyisolate-test-{}-{}",
                tag,
                std::process::id()
            ));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(&dir).unwrap();
            TempTree(dir)
        }
    }

    impl Drop for TempTree {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn stdlib_and_builtin_tables() {
        let env = RuntimeEnv::empty();
        assert!(env.is_stdlib("os"));
        assert!(env.is_stdlib("os.path"));
        assert!(env.is_stdlib("textwrap"));
        assert!(!env.is_stdlib("numpy"));
        assert!(env.is_builtin_name("print"));
        assert!(env.is_builtin_name("len"));
        assert!(!env.is_builtin_name("not_defined_anywhere"));
    }

    #[test]
    fn classify_priority_rules() {
        let mut env = RuntimeEnv::empty();
        env.site_packages.push(PathBuf::from("/venv/lib/site-packages"));
        env.stdlib_paths.push(PathBuf::from("/usr/lib/python3.12"));

        assert_eq!(
            env.classify(&ModuleHandle::main(), true),
            ModuleCategory::Local
        );
        assert_eq!(
            env.classify(&ModuleHandle::builtin("builtins"), false),
            ModuleCategory::Builtin
        );
        // stdlib wins by name even with a file elsewhere
        assert_eq!(
            env.classify(&ModuleHandle::from_file("/usr/lib/python3.12/textwrap.py"), false),
            ModuleCategory::Stdlib
        );
        assert_eq!(
            env.classify(&ModuleHandle::builtin("some_frozen_thing"), false),
            ModuleCategory::Builtin
        );
        assert_eq!(
            env.classify(
                &ModuleHandle::from_file("/venv/lib/site-packages/requests.py"),
                false
            ),
            ModuleCategory::Thirdparty
        );
        let pip = ModuleHandle {
            name: ustr("pip.main"),
            file: Some(PathBuf::from("/venv/lib/site-packages/pip/main.py")),
        };
        assert_eq!(env.classify(&pip, false), ModuleCategory::Stdlib);
        assert_eq!(
            env.classify(&ModuleHandle::from_file("/opt/native/fastthing.so"), false),
            ModuleCategory::Extension
        );
        assert_eq!(
            env.classify(&ModuleHandle::from_file("/home/me/project/app.py"), false),
            ModuleCategory::Local
        );
    }

    #[test]
    fn dist_map_from_top_level_txt() {
        let tmp = TempTree::new("toplevel");
        let info = tmp.0.join("requests-2.32.0.dist-info");
        fs::create_dir_all(&info).unwrap();
        fs::write(info.join("METADATA"), "Name: requests\nVersion: 2.32.0\n\n").unwrap();
        fs::write(info.join("top_level.txt"), "requests\n_internal\n").unwrap();

        let dists = DistMap::scan(&[tmp.0.clone()]);
        assert_eq!(dists.get("requests").unwrap().as_str(), "requests");
        assert!(dists.get("_internal").is_none());
    }

    #[test]
    fn dist_map_from_record_fallback() {
        let tmp = TempTree::new("record");
        let info = tmp.0.join("Pillow-10.0.0.dist-info");
        fs::create_dir_all(&info).unwrap();
        fs::write(info.join("METADATA"), "Name: Pillow\n\n").unwrap();
        fs::write(
            info.join("RECORD"),
            "PIL/__init__.py,sha256=abc,120\n\
             PIL/Image.py,sha256=def,4000\n\
             Pillow-10.0.0.dist-info/METADATA,sha256=ghi,10\n\
             single_mod.py,sha256=jkl,10\n\
             weird.libs/blob.so,sha256=mno,10\n",
        )
        .unwrap();

        let dists = DistMap::scan(&[tmp.0.clone()]);
        assert_eq!(dists.get("PIL").unwrap().as_str(), "Pillow");
        assert_eq!(dists.get("single_mod").unwrap().as_str(), "Pillow");
        assert!(dists.get("weird").is_none());
        assert!(dists.get("Pillow-10").is_none());
    }

    #[test]
    fn dist_name_falls_back_to_dir_prefix() {
        let tmp = TempTree::new("noname");
        let info = tmp.0.join("mylib-1.0.dist-info");
        fs::create_dir_all(&info).unwrap();
        fs::write(info.join("top_level.txt"), "mylib\n").unwrap();

        let dists = DistMap::scan(&[tmp.0.clone()]);
        assert_eq!(dists.get("mylib").unwrap().as_str(), "mylib");
    }

    #[test]
    fn offline_oracle_denies_everything() {
        assert!(!OfflineOracle.on_pypi("requests"));
    }
}
