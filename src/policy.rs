// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Prefix-based access policy for module resolution

/// Decision attached to a policy prefix.
#[derive(Debug, Clone)]
pub enum Access {
    /// Resolution may proceed normally (filesystem / registry access).
    Granted,
    /// Return this value directly as the module's exports, bypassing
    /// resolution entirely.
    Substitute(serde_json::Value),
}

/// Ordered mapping from path/name prefixes to access decisions.
///
/// Rules are checked in insertion order and the first matching prefix
/// wins; with overlapping prefixes the declaration order is the
/// documented tie-break, not an accident. Prefix comparison is
/// path-segment aware: `/srv/app` matches `/srv/app` and
/// `/srv/app/util.js` but not `/srv/application`.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    rules: Vec<(String, Access)>,
}

impl AccessPolicy {
    /// Create an empty policy. An empty policy denies everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy with a single catch-all grant. Used for dependencies
    /// executed with host trust when isolation mode is off.
    pub fn allow_all() -> Self {
        Self::new().grant("")
    }

    /// Append a prefix that grants normal resolution.
    pub fn grant(mut self, prefix: impl Into<String>) -> Self {
        self.rules.push((prefix.into(), Access::Granted));
        self
    }

    /// Append a prefix whose matches resolve to a substitute value
    /// instead of touching the filesystem.
    pub fn substitute(mut self, prefix: impl Into<String>, value: serde_json::Value) -> Self {
        self.rules.push((prefix.into(), Access::Substitute(value)));
        self
    }

    /// First-match lookup. `None` means the policy made no decision,
    /// which the resolver maps to denial.
    pub fn check(&self, candidate: &str) -> Option<&Access> {
        self.rules
            .iter()
            .find(|(prefix, _)| prefix_matches(prefix, candidate))
            .map(|(_, access)| access)
    }

    /// Number of declared rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the policy has no rules at all.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Segment-boundary-aware prefix test. An empty prefix matches any
/// candidate; otherwise the candidate must either equal the prefix or
/// continue with a path separator right after it (unless the prefix
/// itself already ends in one).
fn prefix_matches(prefix: &str, candidate: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    let Some(rest) = candidate.strip_prefix(prefix) else {
        return false;
    };
    if rest.is_empty() || prefix.ends_with('/') || prefix.ends_with('\\') {
        return true;
    }
    rest.starts_with('/') || rest.starts_with('\\')
}
