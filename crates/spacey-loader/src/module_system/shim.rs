// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Metadata for modules that don't describe themselves

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shim descriptor of a non-AMD module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Shim {
    /// The script contains an AMD `define` call that should be ignored
    pub amd: bool,
    /// Global path of the value the script produces
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exports: Option<String>,
    /// Modules that must be ready before the script runs
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,
}

/// Shims keyed by canonical resource name
#[derive(Debug, Clone, Default)]
pub struct ShimStore {
    shims: FxHashMap<String, Shim>,
}

impl ShimStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the shim of a module
    pub fn insert(&mut self, resource: impl Into<String>, shim: Shim) {
        self.shims.insert(resource.into(), shim);
    }

    /// Shim of a module
    pub fn get(&self, resource: &str) -> Option<&Shim> {
        self.shims.get(resource)
    }

    /// Implicit dependencies of a module, empty without a shim
    pub fn deps(&self, resource: &str) -> &[String] {
        self.shims
            .get(resource)
            .map(|shim| shim.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Global export path of a module
    pub fn exports(&self, resource: &str) -> Option<&str> {
        self.shims.get(resource).and_then(|shim| shim.exports.as_deref())
    }

    /// Whether AMD definitions inside the module must be ignored
    pub fn suppresses_amd(&self, resource: &str) -> bool {
        self.shims.get(resource).is_some_and(|shim| shim.amd)
    }

    /// All shims in name order
    pub fn to_map(&self) -> BTreeMap<String, Shim> {
        self.shims
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shim_from_json() {
        let shim: Shim =
            serde_json::from_str(r#"{"amd": true, "exports": "jQuery", "deps": ["a/b"]}"#).unwrap();
        let mut store = ShimStore::new();
        store.insert("vendor/jquery.js", shim);

        assert_eq!(store.exports("vendor/jquery.js"), Some("jQuery"));
        assert_eq!(store.deps("vendor/jquery.js"), ["a/b".to_string()]);
        assert!(store.suppresses_amd("vendor/jquery.js"));
        assert!(store.deps("other.js").is_empty());
    }
}
