// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Source wrapping and line accounting

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// How a script is wrapped and how its exports are extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// Bare-block execution; the exports value is the last evaluated
    /// statement of the block. Synthetic bindings (`require`,
    /// `__filename`, `__dirname`) appear as ordinary globals.
    Plain,
    /// CommonJS-style closure over `(exports, require, module,
    /// __filename, __dirname)`; the exports value is whatever
    /// `module.exports` holds after the closure runs.
    CommonJs,
}

/// File extensions recognized as executable modules.
pub const MODULE_EXTENSIONS: [&str; 2] = ["js", "cjs"];

impl ModuleKind {
    /// Derive the kind from a file extension. Unknown extensions fall
    /// back to [`ModuleKind::Plain`].
    pub fn from_extension(extension: &str) -> Self {
        match extension {
            "cjs" => ModuleKind::CommonJs,
            _ => ModuleKind::Plain,
        }
    }

    /// Derive the kind from a path or logical filename.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(ModuleKind::Plain)
    }
}

// Strips the directive text but keeps its line, so a source that opened
// with the directive keeps its original line numbering.
static STRICT_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^(?:'use strict'|"use strict");?"#).expect("strict directive pattern"));

static LINE_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"line (\d+)").expect("line reference pattern"));

/// Wrap raw source into an executable unit for the given kind.
///
/// Returns the wrapped text and the line offset the wrapping introduced,
/// as a small negative integer: adding it to a line number reported
/// against the wrapped text yields the line in the original source. A
/// leading strict-mode directive in the source is stripped and reinserted
/// at the top so it is present exactly once and line counting stays
/// normalized.
pub(crate) fn wrap(source: &str, kind: ModuleKind) -> (String, i32) {
    let body = STRICT_DIRECTIVE.replace(source, "");
    match kind {
        // Two synthetic lines before the source: directive + opening brace.
        // The `void 0` keeps the directive out of the script's completion
        // value, so a block with no trailing expression yields undefined
        // rather than the directive string.
        ModuleKind::Plain => (format!("'use strict'; void 0;\n{{\n{body}\n}}"), -2),
        // One synthetic line: directive and closure head share it.
        ModuleKind::CommonJs => (
            format!(
                "'use strict'; (function (exports, require, module, __filename, __dirname) {{\n{body}\n}});"
            ),
            -1,
        ),
    }
}

/// Shift every `line N` reference in an engine message by `offset`, so
/// reported positions refer to the original, unwrapped source.
pub(crate) fn shift_line_references(message: &str, offset: i32) -> String {
    LINE_REFERENCE
        .replace_all(message, |caps: &regex::Captures<'_>| {
            let reported: i64 = caps[1].parse().unwrap_or(0);
            format!("line {}", reported + i64::from(offset))
        })
        .into_owned()
}

/// Extract the first `line N` reference from a message, if any.
pub(crate) fn first_line_reference(message: &str) -> Option<u32> {
    LINE_REFERENCE
        .captures(message)
        .and_then(|caps| caps[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_wrap_offset() {
        let (wrapped, offset) = wrap("1 + 1", ModuleKind::Plain);
        assert_eq!(wrapped, "'use strict'; void 0;\n{\n1 + 1\n}");
        assert_eq!(offset, -2);
    }

    #[test]
    fn test_commonjs_wrap_offset() {
        let (wrapped, offset) = wrap("module.exports = 1;", ModuleKind::CommonJs);
        assert!(wrapped.starts_with("'use strict'; (function (exports, require, module, __filename, __dirname) {\n"));
        assert!(wrapped.ends_with("\n});"));
        assert_eq!(offset, -1);
    }

    #[test]
    fn test_strict_directive_prepended_once() {
        let (wrapped, _) = wrap("'use strict';\nlet a = 1;", ModuleKind::Plain);
        assert_eq!(wrapped.matches("use strict").count(), 1);
        // The directive's own line survives as a blank, so the body keeps
        // its original line numbers.
        assert_eq!(wrapped, "'use strict'; void 0;\n{\n\nlet a = 1;\n}");
    }

    #[test]
    fn test_double_quoted_directive_stripped() {
        let (wrapped, _) = wrap("\"use strict\";\n1", ModuleKind::CommonJs);
        assert_eq!(wrapped.matches("use strict").count(), 1);
    }

    #[test]
    fn test_shift_line_references() {
        let shifted = shift_line_references("unexpected token at line 4, col 3", -2);
        assert_eq!(shifted, "unexpected token at line 2, col 3");
        assert_eq!(first_line_reference(&shifted), Some(2));
    }

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(ModuleKind::from_extension("js"), ModuleKind::Plain);
        assert_eq!(ModuleKind::from_extension("cjs"), ModuleKind::CommonJs);
        assert_eq!(ModuleKind::from_extension("txt"), ModuleKind::Plain);
        assert_eq!(ModuleKind::from_path(Path::new("/a/b.cjs")), ModuleKind::CommonJs);
        assert_eq!(ModuleKind::from_path(Path::new("noext")), ModuleKind::Plain);
    }
}
