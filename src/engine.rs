// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Script execution engine

use crate::error::{classify_js_error, Result, SandcellError};
use crate::module_system::{make_require, NativeRegistry};
use crate::policy::AccessPolicy;
use crate::scope::{build_context, freeze_globals, register_frozen, Scope, ScopeSeed};
use crate::wrapper::{first_line_reference, shift_line_references, wrap, ModuleKind};
use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{js_string, Context, JsObject, JsString, JsValue, Script, Source};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Exports extracted from a module, as plain JSON.
pub type Exports = serde_json::Value;

/// Execution budget applied to every script evaluation in a chain.
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    /// Wall-clock budget per evaluation.
    pub timeout: Duration,
    /// Engine loop-iteration ceiling; trips surface as timeouts.
    pub loop_iteration_limit: u64,
    /// Engine recursion ceiling.
    pub recursion_limit: usize,
    /// Interpreter stack size ceiling, in values.
    pub stack_size_limit: usize,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            loop_iteration_limit: 50_000_000,
            recursion_limit: 1024,
            stack_size_limit: 1024 * 1024,
        }
    }
}

/// Options controlling a single top-level execution.
#[derive(Clone)]
pub struct ExecuteOptions {
    /// Wrapping kind. Defaults from the filename extension, then
    /// [`ModuleKind::Plain`].
    pub kind: Option<ModuleKind>,
    /// Logical filename used in diagnostics and as `__filename`.
    pub filename: Option<String>,
    /// Directory used as `__dirname` and as the base for package walks.
    pub directory: Option<PathBuf>,
    /// Override base for relative specifiers in this module's requires.
    /// Defaults to `directory`.
    pub relative_base: Option<PathBuf>,
    /// Access policy consulted on every `require`. The default (empty)
    /// policy denies all requires.
    pub access: AccessPolicy,
    /// Scope to run in. Defaults to the shared empty scope.
    pub scope: Option<Scope>,
    /// Host-provided native modules.
    pub natives: NativeRegistry,
    /// Whether resolved package dependencies stay confined to the same
    /// policy. When off, packages execute with a catch-all grant.
    pub isolate_dependencies: bool,
    /// Execution budget.
    pub limits: RunLimits,
    /// Ceiling on nested `require` depth.
    pub max_require_depth: usize,
    /// Override for the wrap line offset, for callers that pre-wrap or
    /// embed sources at a known line.
    pub line_offset: Option<i32>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            kind: None,
            filename: None,
            directory: None,
            relative_base: None,
            access: AccessPolicy::new(),
            scope: None,
            natives: NativeRegistry::new(),
            isolate_dependencies: true,
            limits: RunLimits::default(),
            max_require_depth: 64,
            line_offset: None,
        }
    }
}

/// Per-module state threaded through a resolution chain. Each nested
/// `require` derives a child with the resolved module's own location
/// and an incremented depth.
pub(crate) struct RequireState {
    pub filename: String,
    pub directory: PathBuf,
    pub relative_base: Option<PathBuf>,
    pub access: Rc<AccessPolicy>,
    pub natives: NativeRegistry,
    pub isolate_dependencies: bool,
    pub limits: RunLimits,
    pub seed: ScopeSeed,
    pub depth: usize,
    pub max_depth: usize,
}

impl RequireState {
    pub(crate) fn child(&self, resolved: &Path) -> RequireState {
        RequireState {
            filename: resolved
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| resolved.display().to_string()),
            directory: resolved
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
            relative_base: None,
            access: Rc::clone(&self.access),
            natives: self.natives.clone(),
            isolate_dependencies: self.isolate_dependencies,
            limits: self.limits,
            seed: self.seed.clone(),
            depth: self.depth + 1,
            max_depth: self.max_depth,
        }
    }

    /// The base directory for this module's relative specifiers:
    /// `directory` with the relative offset joined onto it when one is
    /// set.
    pub(crate) fn relative_dir(&self) -> PathBuf {
        match &self.relative_base {
            Some(base) => self.directory.join(base),
            None => self.directory.clone(),
        }
    }
}

/// Execute a script and extract its exports.
///
/// Plain-kind scripts run inside a fresh composite context derived from
/// the scope's seed bindings, so a shared scope is never mutated.
/// CommonJS-kind scripts run inside the scope's live context and read
/// their exports from `module.exports`.
pub fn execute(source: &str, options: ExecuteOptions) -> Result<Exports> {
    if source.trim().is_empty() {
        return Err(SandcellError::EmptySource);
    }

    let kind = options.kind.unwrap_or_else(|| {
        options
            .filename
            .as_deref()
            .map(|name| ModuleKind::from_path(Path::new(name)))
            .unwrap_or(ModuleKind::Plain)
    });
    let scope = options.scope.clone().unwrap_or_else(Scope::empty);
    let hardened = scope.seed().hardened;

    let directory = match options.directory.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    let filename = options.filename.clone().unwrap_or_else(|| match kind {
        ModuleKind::Plain => "<anonymous>.js".to_string(),
        ModuleKind::CommonJs => "<anonymous>.cjs".to_string(),
    });

    let state = Rc::new(RequireState {
        filename,
        directory,
        relative_base: options.relative_base.clone(),
        access: Rc::new(options.access.clone()),
        natives: options.natives.clone(),
        isolate_dependencies: options.isolate_dependencies,
        limits: options.limits,
        seed: scope.seed().clone(),
        depth: 0,
        max_depth: options.max_require_depth,
    });

    match kind {
        ModuleKind::Plain => {
            let mut context = build_plain_context(&state)?;
            let value = eval_module(&mut context, source, kind, &state, options.line_offset)?;
            finish(value, &mut context, hardened)
        }
        ModuleKind::CommonJs => scope.with_context(|context| {
            let closure = eval_module(context, source, kind, &state, options.line_offset)?;
            let exports = instantiate_cjs(context, &closure, &state)?;
            finish(exports, context, hardened)
        }),
    }
}

/// Build the composite context a plain-kind module runs in: scope seed
/// bindings plus the synthetic `require`, `__filename` and `__dirname`
/// globals, frozen before any script text runs.
pub(crate) fn build_plain_context(state: &Rc<RequireState>) -> Result<Context> {
    let mut context = build_context(&state.seed)?;
    let require = make_require(&mut context, Rc::clone(state))?;
    register_frozen(&mut context, "require", require.into())?;
    register_frozen(
        &mut context,
        "__filename",
        JsString::from(state.filename.as_str()).into(),
    )?;
    register_frozen(
        &mut context,
        "__dirname",
        JsString::from(state.directory.display().to_string().as_str()).into(),
    )?;
    freeze_globals(&mut context)?;
    Ok(context)
}

/// Wrap, parse and evaluate one module's source inside `context`.
///
/// Parse failures come back as compile errors with line references
/// shifted to the unwrapped source; evaluation failures are classified
/// back onto the error taxonomy. An evaluation that completes past the
/// wall-clock budget reports a timeout even if it produced a value.
pub(crate) fn eval_module(
    context: &mut Context,
    source: &str,
    kind: ModuleKind,
    state: &Rc<RequireState>,
    line_offset: Option<i32>,
) -> Result<JsValue> {
    let (wrapped, wrap_offset) = wrap(source, kind);
    let offset = line_offset.unwrap_or(wrap_offset);

    apply_runtime_limits(context, &state.limits);

    let script_source =
        Source::from_reader(wrapped.as_bytes(), Some(Path::new(&state.filename)));
    let script = Script::parse(script_source, None, context).map_err(|e| {
        let raw = e.to_string();
        let raw = raw.strip_prefix("SyntaxError: ").unwrap_or(&raw);
        let message = shift_line_references(raw, offset);
        let line = first_line_reference(&message);
        SandcellError::Compile { message, line }
    })?;

    let started = Instant::now();
    let completion = script.evaluate(context);
    if started.elapsed() > state.limits.timeout {
        return Err(SandcellError::Timeout);
    }
    completion.map_err(|e| classify_js_error(e, offset, context))
}

fn apply_runtime_limits(context: &mut Context, limits: &RunLimits) {
    let mut runtime_limits = boa_engine::vm::RuntimeLimits::default();
    runtime_limits.set_loop_iteration_limit(limits.loop_iteration_limit);
    runtime_limits.set_recursion_limit(limits.recursion_limit);
    runtime_limits.set_stack_size_limit(limits.stack_size_limit);
    context.set_runtime_limits(runtime_limits);
}

/// Call an evaluated CommonJS closure with its five synthetic arguments
/// and read back `module.exports`.
pub(crate) fn instantiate_cjs(
    context: &mut Context,
    closure: &JsValue,
    state: &Rc<RequireState>,
) -> Result<JsValue> {
    let exports = ObjectInitializer::new(context).build();
    let module = ObjectInitializer::new(context)
        .property(
            js_string!("exports"),
            JsValue::from(exports.clone()),
            Attribute::all(),
        )
        .build();
    let require = make_require(context, Rc::clone(state))?;

    let callable: JsObject = closure
        .as_callable()
        .cloned()
        .ok_or_else(|| SandcellError::Internal("module closure is not callable".to_string()))?;

    let args = [
        JsValue::from(exports),
        require.into(),
        JsValue::from(module.clone()),
        JsString::from(state.filename.as_str()).into(),
        JsString::from(state.directory.display().to_string().as_str()).into(),
    ];
    callable
        .call(&JsValue::undefined(), &args, context)
        .map_err(|e| classify_js_error(e, -1, context))?;

    module
        .get(js_string!("exports"), context)
        .map_err(|e| classify_js_error(e, -1, context))
}

/// Flush pending microtasks and convert the exports value to JSON.
/// Hardened scopes defer the flush until after extraction, so queued
/// jobs cannot tamper with what the host observed.
fn finish(value: JsValue, context: &mut Context, hardened: bool) -> Result<Exports> {
    if !hardened {
        let _ = context.run_jobs();
    }
    let exports = if value.is_undefined() || value.is_null() {
        serde_json::Value::Null
    } else {
        value.to_json(context).map_err(|_| {
            SandcellError::Runtime(
                "module exports are not representable as plain data".to_string(),
            )
        })?
    };
    if hardened {
        let _ = context.run_jobs();
    }
    Ok(exports)
}
