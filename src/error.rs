// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for sandboxed module execution

use boa_engine::{Context, JsError, JsNativeError, JsString};
use thiserror::Error;

const KIND_KEY: &str = "__sandcellKind";
const SPECIFIER_KEY: &str = "__sandcellSpecifier";

const KIND_ACCESS_DENIED: &str = "accessDenied";
const KIND_MODULE_NOT_FOUND: &str = "moduleNotFound";

/// Result type for sandcell operations
pub type Result<T> = std::result::Result<T, SandcellError>;

/// Errors that can occur while executing a sandboxed module.
///
/// The first two variants are the resolver's own failures and stay
/// distinguishable from faults raised by the executed script itself, even
/// when they cross the engine boundary through a nested `require` call.
#[derive(Debug, Error)]
pub enum SandcellError {
    /// The access policy had no matching entry for the specifier.
    #[error("Access denied '{0}'")]
    AccessDenied(String),

    /// The policy granted access but resolution or reading failed.
    #[error("Cannot find module '{0}'")]
    ModuleNotFound(String),

    /// The source failed to parse. `line` refers to the original,
    /// unwrapped source (already corrected by the wrap offset).
    #[error("SyntaxError: {message}")]
    Compile {
        /// Engine message with line references shifted to the original source
        message: String,
        /// Corrected line of the first reported position, when present
        line: Option<u32>,
    },

    /// The executed script threw or hit a rejected construct
    /// (including disabled code generation from strings).
    #[error("{0}")]
    Runtime(String),

    /// Execution exceeded the configured budget.
    #[error("Script execution timed out")]
    Timeout,

    /// The caller supplied a zero-length script body.
    #[error("Script source is empty")]
    EmptySource,

    /// File system error
    #[error("File system error: {0}")]
    Fs(#[from] std::io::Error),

    /// Host-side construction failure (scope seeding, value conversion)
    #[error("{0}")]
    Internal(String),
}

impl SandcellError {
    /// Convert into an engine error so a nested `require` failure
    /// propagates through the running script. Policy failures carry their
    /// kind and specifier as marker properties on the error object, which
    /// [`classify_js_error`] reads back on the way out; a script throwing
    /// an error whose message merely imitates ours cannot forge them into
    /// a policy kind.
    pub(crate) fn into_js_error(self, context: &mut Context) -> JsError {
        let tag = match &self {
            SandcellError::AccessDenied(s) => Some((KIND_ACCESS_DENIED, s.clone())),
            SandcellError::ModuleNotFound(s) => Some((KIND_MODULE_NOT_FOUND, s.clone())),
            _ => None,
        };
        let error: JsError = JsNativeError::error().with_message(self.to_string()).into();
        let Some((kind, specifier)) = tag else {
            return error;
        };
        let opaque = error.to_opaque(context);
        if let Some(object) = opaque.as_object() {
            let _ = object.set(JsString::from(KIND_KEY), JsString::from(kind), false, context);
            let _ = object.set(
                JsString::from(SPECIFIER_KEY),
                JsString::from(specifier.as_str()),
                false,
                context,
            );
        }
        JsError::from_opaque(opaque)
    }
}

/// Map an engine error raised during evaluation back onto the taxonomy.
///
/// Policy failures thrown by a nested `require` are recognized by their
/// marker properties and keep their kind; engine limit trips surface as
/// [`SandcellError::Timeout`]; everything else is the script's own fault.
/// `offset` shifts any line references in the message back to the
/// original source.
pub(crate) fn classify_js_error(
    error: JsError,
    offset: i32,
    context: &mut Context,
) -> SandcellError {
    if let Some(classified) = policy_kind(&error, context) {
        return classified;
    }
    let message = error.to_string();
    if message.contains("loop iteration limit") {
        return SandcellError::Timeout;
    }
    SandcellError::Runtime(crate::wrapper::shift_line_references(&message, offset))
}

fn policy_kind(error: &JsError, context: &mut Context) -> Option<SandcellError> {
    // `to_opaque` panics on RuntimeLimit errors, and the engine never
    // attaches policy markers to them anyway.
    if error.as_native().is_some_and(JsNativeError::is_runtime_limit) {
        return None;
    }
    let opaque = error.to_opaque(context);
    let object = opaque.as_object()?;
    let kind = object
        .get(JsString::from(KIND_KEY), context)
        .ok()?
        .as_string()
        .map(|s| s.to_std_string_escaped())?;
    let specifier = object
        .get(JsString::from(SPECIFIER_KEY), context)
        .ok()?
        .as_string()
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_default();
    match kind.as_str() {
        KIND_ACCESS_DENIED => Some(SandcellError::AccessDenied(specifier)),
        KIND_MODULE_NOT_FOUND => Some(SandcellError::ModuleNotFound(specifier)),
        _ => None,
    }
}
