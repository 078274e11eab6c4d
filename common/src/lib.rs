// SPDX-FileCopyrightText: © 2025 pyisolate authors

pub mod closure;
pub mod defs;
pub mod error;
pub mod imports;
pub mod index;
pub mod isolator;
pub mod parser;
pub mod pyenv;
pub mod source;
pub mod usage;
