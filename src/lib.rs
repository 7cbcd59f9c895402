// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Capability-scoped sandboxed execution of JavaScript modules.
//!
//! Scripts run inside isolated scopes whose globals are exactly the
//! bindings the host seeded, with code generation from strings disabled
//! and the global object frozen. Each module's `require` is a
//! capability: an ordered prefix policy decides, before the filesystem
//! is touched, whether a specifier resolves normally, resolves to a
//! host-supplied substitute, or is denied.
//!
//! # Example
//!
//! ```no_run
//! use sandcell::{execute, AccessPolicy, ExecuteOptions};
//!
//! let options = ExecuteOptions {
//!     access: AccessPolicy::new().grant("/srv/app"),
//!     ..Default::default()
//! };
//! let exports = execute("({ answer: 42 })", options)?;
//! assert_eq!(exports["answer"], 42);
//! # Ok::<(), sandcell::SandcellError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod engine;
mod error;
mod loader;
mod module_system;
mod policy;
mod scope;
mod wrapper;

pub use engine::{execute, ExecuteOptions, Exports, RunLimits};
pub use error::{Result, SandcellError};
pub use loader::{load_directory, load_file};
pub use module_system::{NativeModule, NativeRegistry, NativeRegistryBuilder};
pub use policy::{Access, AccessPolicy};
pub use scope::{create_common_scope, create_isolated_scope, Bindings, Scope};
pub use wrapper::{ModuleKind, MODULE_EXTENSIONS};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
