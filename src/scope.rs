// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Isolated scope construction over engine contexts

use crate::error::{Result, SandcellError};
use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{
    js_string, Context, JsNativeError, JsResult, JsString, JsValue, NativeFunction, Source,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Seed bindings for an isolated scope: global name to JSON value.
pub type Bindings = serde_json::Map<String, serde_json::Value>;

/// The immutable recipe a scope was built from. Plain-kind executions
/// derive their fresh composite contexts from this seed rather than from
/// the live context, so a shared scope is never mutated.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScopeSeed {
    pub bindings: Bindings,
    pub hardened: bool,
    pub common: bool,
}

struct ScopeInner {
    seed: ScopeSeed,
    context: RefCell<Context>,
}

/// Handle to an isolated global scope.
///
/// The handle is cheaply cloneable and may be shared between a caller
/// and every module loaded within one resolution chain. The binding set
/// is fixed at construction: the execution engine never adds entries to
/// a scope it did not create.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

thread_local! {
    // Contexts are thread-bound, so the process-wide shared empty scope
    // renders as one lazily-initialized constant per thread.
    static SHARED_EMPTY: Scope = Scope::from_seed(ScopeSeed::default())
        .expect("failed to initialize the shared empty scope");
}

impl Scope {
    /// Build a scope seeded with exactly `bindings` (no implicit global
    /// leakage). Code generation from strings is disabled and the global
    /// object is frozen. `hardened` defers the microtask flush until
    /// after the host has extracted the exports.
    pub fn new(bindings: Bindings, hardened: bool) -> Result<Self> {
        Self::from_seed(ScopeSeed {
            bindings,
            hardened,
            common: false,
        })
    }

    /// The shared empty scope used when the caller supplies none.
    pub fn empty() -> Self {
        SHARED_EMPTY.with(Scope::clone)
    }

    fn from_seed(seed: ScopeSeed) -> Result<Self> {
        let mut context = build_context(&seed)?;
        freeze_globals(&mut context)?;
        Ok(Self {
            inner: Rc::new(ScopeInner {
                seed,
                context: RefCell::new(context),
            }),
        })
    }

    pub(crate) fn seed(&self) -> &ScopeSeed {
        &self.inner.seed
    }

    /// Run `f` against the scope's live context. CommonJS executions go
    /// through here; nested requires re-enter via the `&mut Context`
    /// they already hold, never through a second borrow.
    pub(crate) fn with_context<R>(&self, f: impl FnOnce(&mut Context) -> R) -> R {
        f(&mut self.inner.context.borrow_mut())
    }
}

/// Create an isolated scope. `None` bindings return the shared empty
/// singleton; otherwise a fresh scope is constructed.
pub fn create_isolated_scope(bindings: Option<Bindings>, hardened: bool) -> Result<Scope> {
    match bindings {
        None if !hardened => Ok(Scope::empty()),
        None => Scope::new(Bindings::new(), hardened),
        Some(bindings) => Scope::new(bindings, hardened),
    }
}

/// Create a scope preloaded with the shared host facilities on top of
/// any seeded `bindings`. Currently that is a `console` whose output is
/// routed to the host's logging; the facilities are installed fresh
/// into every composite context derived from the scope.
pub fn create_common_scope(bindings: Option<Bindings>, hardened: bool) -> Result<Scope> {
    Scope::from_seed(ScopeSeed {
        bindings: bindings.unwrap_or_default(),
        hardened,
        common: true,
    })
}

/// Build an unfrozen context seeded from `seed`: code-generation guards
/// installed, seed bindings registered as read-only globals. Callers add
/// any synthetic bindings and then freeze.
pub(crate) fn build_context(seed: &ScopeSeed) -> Result<Context> {
    let mut context = Context::default();
    install_code_generation_guards(&mut context)?;
    if seed.common {
        install_console(&mut context)?;
    }
    for (name, value) in &seed.bindings {
        let seeded = JsValue::from_json(value, &mut context)
            .map_err(|e| SandcellError::Internal(format!("invalid scope binding '{name}': {e}")))?;
        register_frozen(&mut context, name, seeded)?;
    }
    Ok(context)
}

/// Register a non-writable, non-configurable global binding.
pub(crate) fn register_frozen(context: &mut Context, name: &str, value: JsValue) -> Result<()> {
    context
        .register_global_property(JsString::from(name), value, Attribute::ENUMERABLE)
        .map_err(|e| SandcellError::Internal(format!("failed to bind global '{name}': {e}")))
}

/// Freeze the global object so scripts cannot add or replace bindings.
pub(crate) fn freeze_globals(context: &mut Context) -> Result<()> {
    context
        .eval(Source::from_bytes("Object.freeze(globalThis);"))
        .map_err(|e| SandcellError::Internal(format!("failed to freeze scope globals: {e}")))?;
    Ok(())
}

fn reject_code_generation(_this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    Err(JsNativeError::eval()
        .with_message("Code generation from strings is not allowed in this context")
        .into())
}

fn console_message(args: &[JsValue], context: &mut Context) -> JsResult<String> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        parts.push(arg.to_string(context)?.to_std_string_escaped());
    }
    Ok(parts.join(" "))
}

fn console_log(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let line = console_message(args, ctx)?;
    tracing::info!(target: "script", "{line}");
    Ok(JsValue::undefined())
}

fn console_warn(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let line = console_message(args, ctx)?;
    tracing::warn!(target: "script", "{line}");
    Ok(JsValue::undefined())
}

fn console_error(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let line = console_message(args, ctx)?;
    tracing::error!(target: "script", "{line}");
    Ok(JsValue::undefined())
}

fn console_debug(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let line = console_message(args, ctx)?;
    tracing::debug!(target: "script", "{line}");
    Ok(JsValue::undefined())
}

/// Install a `console` whose methods forward to the host's logging.
fn install_console(context: &mut Context) -> Result<()> {
    let console = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(console_log), js_string!("log"), 1)
        .function(NativeFunction::from_fn_ptr(console_log), js_string!("info"), 1)
        .function(NativeFunction::from_fn_ptr(console_warn), js_string!("warn"), 1)
        .function(NativeFunction::from_fn_ptr(console_error), js_string!("error"), 1)
        .function(NativeFunction::from_fn_ptr(console_debug), js_string!("debug"), 1)
        .function(NativeFunction::from_fn_ptr(console_debug), js_string!("trace"), 1)
        .build();
    register_frozen(context, "console", console.into())
}

/// Replace the global `eval` and `Function` bindings with rejecting
/// natives. This enforces the no-strings policy at the scope boundary;
/// deeper engine-level escape vectors are out of scope.
fn install_code_generation_guards(context: &mut Context) -> Result<()> {
    for name in ["eval", "Function"] {
        context
            .register_global_callable(
                JsString::from(name),
                1,
                NativeFunction::from_fn_ptr(reject_code_generation),
            )
            .map_err(|e| {
                SandcellError::Internal(format!("failed to install guard for '{name}': {e}"))
            })?;
    }
    Ok(())
}
