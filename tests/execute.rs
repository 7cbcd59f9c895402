// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Integration tests for script execution and scope isolation

use sandcell::{
    create_common_scope, create_isolated_scope, execute, Bindings, ExecuteOptions, ModuleKind,
    RunLimits, SandcellError,
};
use serde_json::json;
use std::time::Duration;

fn plain_options() -> ExecuteOptions {
    ExecuteOptions {
        kind: Some(ModuleKind::Plain),
        ..Default::default()
    }
}

fn cjs_options() -> ExecuteOptions {
    ExecuteOptions {
        kind: Some(ModuleKind::CommonJs),
        ..Default::default()
    }
}

#[test]
fn plain_module_exports_last_expression() {
    let exports = execute("({ field: 'value', count: 3 })", plain_options()).unwrap();
    assert_eq!(exports, json!({"field": "value", "count": 3}));
}

#[test]
fn plain_module_with_statements_before_the_export() {
    let source = "const base = 40;\nconst extra = 2;\n({ answer: base + extra })";
    let exports = execute(source, plain_options()).unwrap();
    assert_eq!(exports, json!({"answer": 42}));
}

#[test]
fn commonjs_module_exports_module_exports() {
    let source = "module.exports = { field: 'value' };";
    let exports = execute(source, cjs_options()).unwrap();
    assert_eq!(exports, json!({"field": "value"}));
}

#[test]
fn commonjs_exports_alias_works() {
    let source = "exports.a = 1;\nexports.b = 'two';";
    let exports = execute(source, cjs_options()).unwrap();
    assert_eq!(exports, json!({"a": 1, "b": "two"}));
}

#[test]
fn commonjs_can_replace_the_exports_object() {
    let source = "exports.ignored = true;\nmodule.exports = [1, 2, 3];";
    let exports = execute(source, cjs_options()).unwrap();
    assert_eq!(exports, json!([1, 2, 3]));
}

#[test]
fn kind_defaults_from_filename_extension() {
    let options = ExecuteOptions {
        filename: Some("mod.cjs".to_string()),
        ..Default::default()
    };
    let exports = execute("module.exports = 7;", options).unwrap();
    assert_eq!(exports, json!(7));
}

#[test]
fn empty_source_is_rejected() {
    assert!(matches!(
        execute("", plain_options()),
        Err(SandcellError::EmptySource)
    ));
    assert!(matches!(
        execute("   \n\t  ", cjs_options()),
        Err(SandcellError::EmptySource)
    ));
}

#[test]
fn compile_error_reports_original_line_first() {
    // Error on the very first source line.
    let result = execute("let x = ;", plain_options());
    match result {
        Err(SandcellError::Compile { line, .. }) => assert_eq!(line, Some(1)),
        other => panic!("expected compile error, got {other:?}"),
    }
}

#[test]
fn compile_error_reports_original_line_middle() {
    let source = "let a = 1;\nlet b = 2;\nlet c = ;\nlet d = 4;";
    let result = execute(source, plain_options());
    match result {
        Err(SandcellError::Compile { line, message }) => {
            assert_eq!(line, Some(3), "message was: {message}");
        }
        other => panic!("expected compile error, got {other:?}"),
    }
}

#[test]
fn compile_error_reports_original_line_last() {
    let source = "let a = 1;\nlet b = 2;\nlet c = ;";
    match execute(source, plain_options()) {
        Err(SandcellError::Compile { line, message }) => {
            assert_eq!(line, Some(3), "message was: {message}");
        }
        other => panic!("expected compile error, got {other:?}"),
    }
}

#[test]
fn compile_error_line_accounting_matches_for_both_kinds() {
    let source = "let a = 1;\nlet b = ;";
    for options in [plain_options(), cjs_options()] {
        match execute(source, options) {
            Err(SandcellError::Compile { line, message }) => {
                assert_eq!(line, Some(2), "message was: {message}");
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }
}

#[test]
fn strict_directive_does_not_shift_line_accounting() {
    let source = "'use strict';\nlet a = 1;\nlet b = ;";
    match execute(source, plain_options()) {
        // The stripped directive line stays part of the source count.
        Err(SandcellError::Compile { line, .. }) => assert_eq!(line, Some(3)),
        other => panic!("expected compile error, got {other:?}"),
    }
}

#[test]
fn thrown_errors_surface_as_runtime_faults() {
    let result = execute("throw new Error('boom');", plain_options());
    match result {
        Err(SandcellError::Runtime(msg)) => assert!(msg.contains("boom"), "got: {msg}"),
        other => panic!("expected runtime fault, got {other:?}"),
    }
}

#[test]
fn eval_is_disabled() {
    let result = execute("eval('1 + 1')", plain_options());
    match result {
        Err(SandcellError::Runtime(msg)) => {
            assert!(msg.contains("Code generation"), "got: {msg}");
        }
        other => panic!("expected runtime fault, got {other:?}"),
    }
}

#[test]
fn function_constructor_is_disabled() {
    let result = execute("const f = Function('return 1'); ({ v: f() })", plain_options());
    assert!(matches!(result, Err(SandcellError::Runtime(_))));
}

#[test]
fn runaway_loop_reports_timeout() {
    let options = ExecuteOptions {
        limits: RunLimits {
            timeout: Duration::from_millis(200),
            loop_iteration_limit: 100_000,
            ..Default::default()
        },
        ..plain_options()
    };
    let result = execute("while (true) {}", options);
    assert!(matches!(result, Err(SandcellError::Timeout)));
}

#[test]
fn seeded_bindings_are_visible_to_the_script() {
    let mut bindings = Bindings::new();
    bindings.insert("config".to_string(), json!({"debug": true, "retries": 3}));
    let scope = create_isolated_scope(Some(bindings), false).unwrap();

    let options = ExecuteOptions {
        scope: Some(scope),
        ..plain_options()
    };
    let exports = execute("({ debug: config.debug, retries: config.retries })", options).unwrap();
    assert_eq!(exports, json!({"debug": true, "retries": 3}));
}

#[test]
fn plain_executions_do_not_leak_between_calls() {
    let exports = execute("let leaked = 'secret'; ({ ok: true })", plain_options()).unwrap();
    assert_eq!(exports, json!({"ok": true}));

    // A later execution in the same (default) scope must not see the
    // earlier script's bindings.
    let exports = execute("({ type: typeof leaked })", plain_options()).unwrap();
    assert_eq!(exports, json!({"type": "undefined"}));
}

#[test]
fn scripts_cannot_pollute_seeded_globals() {
    let mut bindings = Bindings::new();
    bindings.insert("limit".to_string(), json!(10));
    let scope = create_isolated_scope(Some(bindings), false).unwrap();

    let first = ExecuteOptions {
        scope: Some(scope.clone()),
        ..plain_options()
    };
    // Attempted overwrite of a frozen global is inert under non-throwing
    // semantics or throws under strict mode; either way the next reader
    // sees the seeded value.
    let _ = execute("try { limit = 99; } catch (e) {} ({})", first);

    let second = ExecuteOptions {
        scope: Some(scope),
        ..plain_options()
    };
    let exports = execute("({ limit: limit })", second).unwrap();
    assert_eq!(exports, json!({"limit": 10}));
}

#[test]
fn two_scopes_are_independent() {
    let mut a = Bindings::new();
    a.insert("name".to_string(), json!("alpha"));
    let mut b = Bindings::new();
    b.insert("name".to_string(), json!("beta"));

    let scope_a = create_isolated_scope(Some(a), false).unwrap();
    let scope_b = create_isolated_scope(Some(b), false).unwrap();

    let read = |scope| {
        execute(
            "({ name: name })",
            ExecuteOptions {
                scope: Some(scope),
                ..plain_options()
            },
        )
        .unwrap()
    };
    assert_eq!(read(scope_a), json!({"name": "alpha"}));
    assert_eq!(read(scope_b), json!({"name": "beta"}));
}

#[test]
fn shared_scope_serves_multiple_commonjs_runs() {
    let mut bindings = Bindings::new();
    bindings.insert("greeting".to_string(), json!("hello"));
    let scope = create_isolated_scope(Some(bindings), false).unwrap();

    for _ in 0..2 {
        let options = ExecuteOptions {
            scope: Some(scope.clone()),
            ..cjs_options()
        };
        let exports = execute("module.exports = greeting + ' world';", options).unwrap();
        assert_eq!(exports, json!("hello world"));
    }
}

#[test]
fn undefined_exports_become_null() {
    let exports = execute("let a = 1;", plain_options()).unwrap();
    assert_eq!(exports, serde_json::Value::Null);
}

#[test]
fn structured_exports_survive_extraction() {
    let source = "({ items: [1, 'two', { three: true }], empty: null })";
    let exports = execute(source, plain_options()).unwrap();
    assert_eq!(
        exports,
        json!({"items": [1, "two", {"three": true}], "empty": null})
    );
}

#[test]
fn filename_and_dirname_are_bound_for_plain_modules() {
    let options = ExecuteOptions {
        filename: Some("entry.js".to_string()),
        directory: Some("/srv/app".into()),
        ..plain_options()
    };
    let exports = execute("({ file: __filename, dir: __dirname })", options).unwrap();
    assert_eq!(exports, json!({"file": "entry.js", "dir": "/srv/app"}));
}

#[test]
fn filename_and_dirname_are_passed_to_commonjs_modules() {
    let options = ExecuteOptions {
        filename: Some("entry.cjs".to_string()),
        directory: Some("/srv/app".into()),
        ..cjs_options()
    };
    let exports = execute(
        "module.exports = { file: __filename, dir: __dirname };",
        options,
    )
    .unwrap();
    assert_eq!(exports, json!({"file": "entry.cjs", "dir": "/srv/app"}));
}

#[test]
fn imitated_denial_message_stays_a_runtime_fault() {
    // A script cannot forge a policy failure by throwing an error whose
    // message copies the denial text.
    let result = execute("throw new Error(\"Access denied 'fs'\");", plain_options());
    assert!(matches!(result, Err(SandcellError::Runtime(_))));
}

#[test]
fn common_scope_provides_console() {
    let scope = create_common_scope(None, false).unwrap();
    let options = ExecuteOptions {
        scope: Some(scope),
        ..plain_options()
    };
    let source = "console.log('starting');\n({ kind: typeof console.log })";
    let exports = execute(source, options).unwrap();
    assert_eq!(exports, json!({"kind": "function"}));

    // The default scope stays bare.
    let exports = execute("({ kind: typeof console })", plain_options()).unwrap();
    assert_eq!(exports, json!({"kind": "undefined"}));
}

#[test]
fn hardened_scope_still_extracts_exports() {
    let scope = create_isolated_scope(None, true).unwrap();
    let options = ExecuteOptions {
        scope: Some(scope),
        ..plain_options()
    };
    let exports = execute("({ hardened: true })", options).unwrap();
    assert_eq!(exports, json!({"hardened": true}));
}
