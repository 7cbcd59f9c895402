// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module path resolution

use crate::error::{Result, SandcellError};
use crate::wrapper::MODULE_EXTENSIONS;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

/// Whether a specifier names a location rather than a bare package or
/// native module. Locations go through path normalization and the
/// path-prefix side of the access policy.
pub(crate) fn is_path_like(specifier: &str) -> bool {
    specifier.starts_with('.')
        || specifier.contains('/')
        || specifier.contains('\\')
        || (cfg!(windows) && specifier.chars().nth(1) == Some(':'))
}

/// Lexically normalize a path: resolve `.` and `..` segments without
/// touching the filesystem, so the policy sees the same canonical form
/// the resolver probes.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Resolve a path-like target to a concrete file.
///
/// Probes in order: the exact path, the path with each recognized
/// extension appended, then directory resolution (`package.json` main
/// followed by index files). The error carries the specifier the caller
/// asked for, not an intermediate probe.
pub(crate) fn resolve_file(path: &Path, specifier: &str) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    for ext in MODULE_EXTENSIONS {
        let mut filename = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        filename.push('.');
        filename.push_str(ext);
        let with_ext = path.with_file_name(&filename);
        if with_ext.is_file() {
            return Ok(with_ext);
        }
    }

    if path.is_dir() {
        return resolve_directory(path, specifier);
    }

    Err(SandcellError::ModuleNotFound(specifier.to_string()))
}

/// Resolve a directory: `package.json` `main` first, index files second.
fn resolve_directory(dir: &Path, specifier: &str) -> Result<PathBuf> {
    let package_json_path = dir.join("package.json");
    if package_json_path.is_file() {
        if let Ok(content) = std::fs::read_to_string(&package_json_path) {
            if let Ok(pkg) = serde_json::from_str::<PackageJson>(&content) {
                if let Some(main) = pkg.main {
                    let main_path = normalize(&dir.join(&main));
                    if main_path.is_file() {
                        return Ok(main_path);
                    }
                    for ext in MODULE_EXTENSIONS {
                        let with_ext = main_path.with_extension(ext);
                        if with_ext.is_file() {
                            return Ok(with_ext);
                        }
                    }
                }
            }
        }
    }

    for ext in MODULE_EXTENSIONS {
        let index = dir.join(format!("index.{ext}"));
        if index.is_file() {
            return Ok(index);
        }
    }

    Err(SandcellError::ModuleNotFound(specifier.to_string()))
}

/// Resolve a bare package name by walking `node_modules` directories up
/// from `from_dir`.
pub(crate) fn resolve_package(specifier: &str, from_dir: &Path) -> Result<PathBuf> {
    let (package_name, subpath) = parse_package_specifier(specifier);

    let mut current = Some(from_dir);
    while let Some(dir) = current {
        let package_root = dir.join("node_modules").join(package_name);
        if package_root.exists() {
            return match subpath {
                Some(sub) => resolve_file(&package_root.join(sub), specifier),
                None => resolve_directory(&package_root, specifier),
            };
        }
        current = dir.parent();
    }

    Err(SandcellError::ModuleNotFound(specifier.to_string()))
}

/// Split a package specifier into name and optional subpath, honoring
/// `@scope/name` package names.
fn parse_package_specifier(specifier: &str) -> (&str, Option<&str>) {
    if specifier.starts_with('@') {
        if let Some(slash_pos) = specifier[1..].find('/') {
            let after_scope = &specifier[slash_pos + 2..];
            if let Some(subpath_pos) = after_scope.find('/') {
                let name_end = slash_pos + 2 + subpath_pos;
                return (&specifier[..name_end], Some(&specifier[name_end + 1..]));
            }
        }
        (specifier, None)
    } else if let Some(slash_pos) = specifier.find('/') {
        (&specifier[..slash_pos], Some(&specifier[slash_pos + 1..]))
    } else {
        (specifier, None)
    }
}

/// Minimal package.json structure for resolution
#[derive(Debug, Deserialize)]
struct PackageJson {
    main: Option<String>,
}
