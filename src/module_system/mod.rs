// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module resolution and the capability-scoped `require`

mod natives;
mod require;
mod resolver;

pub use natives::{NativeModule, NativeRegistry, NativeRegistryBuilder};

pub(crate) use require::make_require;
