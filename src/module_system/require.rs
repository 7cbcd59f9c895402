// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The capability-scoped `require` binding

use crate::engine::{build_plain_context, eval_module, instantiate_cjs, RequireState};
use crate::error::{classify_js_error, Result, SandcellError};
use crate::module_system::resolver::{is_path_like, normalize, resolve_file, resolve_package};
use crate::policy::{Access, AccessPolicy};
use crate::wrapper::ModuleKind;
use boa_engine::object::builtins::JsFunction;
use boa_engine::object::FunctionObjectBuilder;
use boa_engine::{js_string, Context, JsArgs, JsValue, NativeFunction};
use boa_gc::{empty_trace, Finalize, Trace};
use std::path::Path;
use std::rc::Rc;

#[derive(Finalize)]
struct RequireCaptures {
    state: Rc<RequireState>,
}

// The captured state holds no GC-managed values.
unsafe impl Trace for RequireCaptures {
    empty_trace!();
}

/// Build the `require` function bound to one module's resolution state.
pub(crate) fn make_require(context: &mut Context, state: Rc<RequireState>) -> Result<JsFunction> {
    let native = unsafe {
        NativeFunction::from_closure_with_captures(
            |_this, args, captures, ctx| {
                let specifier = args
                    .get_or_undefined(0)
                    .to_string(ctx)?
                    .to_std_string_escaped();
                resolve_require(&specifier, &captures.state, ctx)
                    .map_err(|e| e.into_js_error(ctx))
            },
            RequireCaptures { state },
        )
    };
    Ok(FunctionObjectBuilder::new(context.realm(), native)
        .name(js_string!("require"))
        .length(1)
        .constructor(false)
        .build())
}

/// Resolve one `require(specifier)` call.
///
/// The access policy is consulted before the filesystem is touched, on
/// the normalized path for path-like specifiers and on the raw name for
/// bare ones. A specifier the policy says nothing about is denied.
pub(crate) fn resolve_require(
    specifier: &str,
    state: &Rc<RequireState>,
    context: &mut Context,
) -> Result<JsValue> {
    if state.depth >= state.max_depth {
        return Err(SandcellError::Runtime(format!(
            "Maximum require depth ({}) exceeded while resolving '{specifier}'",
            state.max_depth
        )));
    }
    if specifier.is_empty() {
        return Err(SandcellError::ModuleNotFound(specifier.to_string()));
    }
    tracing::debug!(specifier, depth = state.depth, from = %state.filename, "resolving module");

    if is_path_like(specifier) {
        let raw = Path::new(specifier);
        let target = if raw.is_absolute() {
            normalize(raw)
        } else {
            normalize(&state.relative_dir().join(raw))
        };
        let candidate = target.to_string_lossy();
        match state.access.check(&candidate) {
            // Deny with the specifier the script asked for, not the
            // normalized candidate the policy evaluated.
            None => Err(SandcellError::AccessDenied(specifier.to_string())),
            Some(Access::Substitute(value)) => {
                JsValue::from_json(value, context).map_err(|e| classify_js_error(e, 0, context))
            }
            Some(Access::Granted) => {
                let resolved = resolve_file(&target, specifier)?;
                load_module_file(&resolved, specifier, state.child(&resolved), context)
            }
        }
    } else {
        match state.access.check(specifier) {
            None => Err(SandcellError::AccessDenied(specifier.to_string())),
            Some(Access::Substitute(value)) => {
                JsValue::from_json(value, context).map_err(|e| classify_js_error(e, 0, context))
            }
            Some(Access::Granted) => {
                if let Some(built) = state.natives.instantiate(specifier, context) {
                    return built.map_err(|e| classify_js_error(e, 0, context));
                }
                let resolved = resolve_package(specifier, &state.directory)?;
                let mut child = state.child(&resolved);
                if !state.isolate_dependencies {
                    child.access = Rc::new(AccessPolicy::allow_all());
                }
                load_module_file(&resolved, specifier, child, context)
            }
        }
    }
}

/// Read and execute a resolved module file, returning its exports as an
/// engine value for the requiring script.
///
/// CommonJS modules execute inside the caller's context; plain modules
/// get a fresh composite context seeded from the same scope recipe, so
/// their bare-block globals never collide with the caller's.
fn load_module_file(
    path: &Path,
    specifier: &str,
    child: RequireState,
    context: &mut Context,
) -> Result<JsValue> {
    let source = std::fs::read_to_string(path)
        .map_err(|_| SandcellError::ModuleNotFound(specifier.to_string()))?;
    let kind = ModuleKind::from_path(path);
    let child = Rc::new(child);
    tracing::debug!(path = %path.display(), ?kind, depth = child.depth, "loading module file");

    match kind {
        ModuleKind::CommonJs => {
            let closure = eval_module(context, &source, kind, &child, None)?;
            instantiate_cjs(context, &closure, &child)
        }
        ModuleKind::Plain => {
            let mut fresh = build_plain_context(&child)?;
            let value = eval_module(&mut fresh, &source, kind, &child, None)?;
            if !child.seed.hardened {
                let _ = fresh.run_jobs();
            }
            Ok(value)
        }
    }
}
