// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host-registered native modules

use boa_engine::{Context, JsResult, JsValue};
use std::collections::HashMap;
use std::rc::Rc;

/// A module the host provides directly, short-circuiting filesystem
/// resolution for its bare name. The name must still be granted by the
/// access policy before the registry is consulted.
#[derive(Clone)]
pub enum NativeModule {
    /// Fixed JSON exports, converted into the requesting context.
    Data(serde_json::Value),
    /// Exports built per request against the requesting context. Used
    /// for modules whose exports include functions.
    Factory(Rc<dyn Fn(&mut Context) -> JsResult<JsValue>>),
}

impl std::fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeModule::Data(value) => f.debug_tuple("Data").field(value).finish(),
            NativeModule::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Registry of native modules keyed by bare specifier.
#[derive(Debug, Clone, Default)]
pub struct NativeRegistry {
    modules: Rc<HashMap<String, NativeModule>>,
}

impl NativeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder for a populated registry.
    pub fn builder() -> NativeRegistryBuilder {
        NativeRegistryBuilder::default()
    }

    pub(crate) fn get(&self, name: &str) -> Option<&NativeModule> {
        self.modules.get(name)
    }

    /// Instantiate a registered module's exports in `context`, or
    /// `None` when the name is not registered.
    pub(crate) fn instantiate(&self, name: &str, context: &mut Context) -> Option<JsResult<JsValue>> {
        match self.get(name)? {
            NativeModule::Data(value) => Some(JsValue::from_json(value, context)),
            NativeModule::Factory(build) => Some(build(context)),
        }
    }
}

/// Builder for [`NativeRegistry`].
#[derive(Default)]
pub struct NativeRegistryBuilder {
    modules: HashMap<String, NativeModule>,
}

impl NativeRegistryBuilder {
    /// Register fixed JSON exports under `name`.
    pub fn data(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.modules.insert(name.into(), NativeModule::Data(value));
        self
    }

    /// Register a per-request exports factory under `name`.
    pub fn factory(
        mut self,
        name: impl Into<String>,
        build: impl Fn(&mut Context) -> JsResult<JsValue> + 'static,
    ) -> Self {
        self.modules
            .insert(name.into(), NativeModule::Factory(Rc::new(build)));
        self
    }

    /// Finish the registry.
    pub fn build(self) -> NativeRegistry {
        NativeRegistry {
            modules: Rc::new(self.modules),
        }
    }
}
