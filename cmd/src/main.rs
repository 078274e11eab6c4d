// SPDX-FileCopyrightText: © 2025 pyisolate authors

use common::isolator::{IsolateOptions, Isolator};
use common::pyenv::{OfflineOracle, RuntimeEnv};
use common::source::{Entry, ModuleHandle};
use log::{info, warn};
use std::env;
use std::path::PathBuf;
use std::process::exit;

fn usage() -> ! {
    eprintln!(
        "usage: pyisolate --module FILE --entry NAME [--entry NAME ...]\n\
         \n\
         options:\n\
         \x20 --python EXE            probe this interpreter for stdlib/site-packages paths\n\
         \x20 --site-packages DIR     add a site-packages directory (repeatable)\n\
         \x20 --offline               skip the package-index probe\n\
         \x20 --no-sort-imports       keep imports in discovery order\n\
         \x20 --drop-dynamic-imports  omit dynamic-import assignments from output\n\
         \x20 --keep-inner-functions  do not collapse functions nested in functions\n\
         \x20 --keep-methods          do not collapse method bodies\n\
         \x20 --log LEVEL             stderr log level (default: warn)"
    );
    exit(2);
}

fn setup_logger(level: &str) {
    let level = match level.parse() {
        Ok(level) => level,
        Err(_) => {
            eprintln!("invalid log level: {}", level);
            exit(2);
        }
    };
    fern::Dispatch::new()
        .format(|out, message, record| out.finish(format_args!("{}: {}", record.level(), message)))
        .level(level)
        .chain(std::io::stderr())
        .apply()
        .expect("failed to configure logger");
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage();
    }

    let mut module_file: Option<PathBuf> = None;
    let mut entry_names: Vec<String> = Vec::new();
    let mut python: Option<String> = None;
    let mut site_packages: Vec<PathBuf> = Vec::new();
    let mut offline = false;
    let mut log_level = "warn".to_string();
    let mut options = IsolateOptions::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--module" if i + 1 < args.len() => {
                i += 1;
                module_file = Some(PathBuf::from(&args[i]));
            }
            "--entry" if i + 1 < args.len() => {
                i += 1;
                entry_names.push(args[i].clone());
            }
            "--python" if i + 1 < args.len() => {
                i += 1;
                python = Some(args[i].clone());
            }
            "--site-packages" if i + 1 < args.len() => {
                i += 1;
                site_packages.push(PathBuf::from(&args[i]));
            }
            "--log" if i + 1 < args.len() => {
                i += 1;
                log_level = args[i].clone();
            }
            "--offline" => offline = true,
            "--no-sort-imports" => options.sort_imports = false,
            "--drop-dynamic-imports" => options.keep_dynamic_imports = false,
            "--keep-inner-functions" => options.collapse_inner_functions = false,
            "--keep-methods" => options.collapse_methods = false,
            "--help" | "-h" => usage(),
            other => {
                eprintln!("unknown argument: {}", other);
                usage();
            }
        }
        i += 1;
    }

    let Some(module_file) = module_file else {
        eprintln!("--module is required");
        usage();
    };
    if entry_names.is_empty() {
        eprintln!("at least one --entry is required");
        usage();
    }

    setup_logger(&log_level);

    let mut env = match &python {
        Some(exe) => match RuntimeEnv::from_interpreter(exe) {
            Ok(env) => env,
            Err(err) => {
                eprintln!("failed to probe {}: {}", exe, err);
                exit(1);
            }
        },
        None => RuntimeEnv::empty(),
    };
    if !site_packages.is_empty() {
        env.site_packages.extend(site_packages);
        env.rebuild_dists();
    }
    info!(
        "environment: python 3.{}, {} installed distributions",
        env.python_minor,
        env.dists.len()
    );

    let module = ModuleHandle::from_file(&module_file);
    let entries: Vec<Entry> = entry_names
        .iter()
        .map(|name| Entry::new(module.clone(), name))
        .collect();

    let mut isolator = Isolator::new(env, options);
    if offline {
        isolator = isolator.with_oracle(Box::new(OfflineOracle));
    }

    match isolator.isolate(&entries) {
        Ok(bundle) => {
            print!("{}", bundle.source);
            if !bundle.reqs_pypi.is_empty() {
                info!("requirements: pip install {}", bundle.reqs_pypi.join(" "));
            }
            if !bundle.reqs_unknown.is_empty() {
                warn!(
                    "distributions not found on the index: {}",
                    bundle.reqs_unknown.join(", ")
                );
            }
            exit(0);
        }
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    }
}
