// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader configuration
//!
//! [`ConfigOptions`] is a partial update merged into the loader by
//! [`Loader::configure`](crate::Loader::configure). Only the options that are
//! present take effect. It deserializes from the usual JSON shape:
//!
//! ```json
//! {
//!   "baseUrl": "resources/",
//!   "paths": { "my/app": "./app/", "old/lib": null },
//!   "shim": { "vendor/jquery": { "amd": true, "exports": "jQuery" } },
//!   "map": { "*": { "lib": "lib-v2" } },
//!   "async": true,
//!   "debugSources": false,
//!   "depCache": { "my/app/Main.js": ["my/app/util"] }
//! }
//! ```

use crate::error::{LoaderError, Result};
use crate::module_system::Shim;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

/// Predicate selecting modules whose bundled payload must be ignored
#[derive(Clone)]
pub struct BundleFilter(Rc<dyn Fn(&str) -> bool>);

impl BundleFilter {
    /// Wrap a predicate over canonical module names
    pub fn new(f: impl Fn(&str) -> bool + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Whether the bundled payload of `module` must be skipped
    pub fn matches(&self, module: &str) -> bool {
        (self.0)(module)
    }
}

impl fmt::Debug for BundleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BundleFilter")
    }
}

/// Partial configuration update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigOptions {
    /// Location of the empty identifier prefix
    pub base_url: Option<String>,

    /// Identifier prefix to location; `null` removes a prefix
    pub paths: BTreeMap<String, Option<String>>,

    /// Descriptors of non-AMD modules, keyed by module identifier
    pub shim: BTreeMap<String, Shim>,

    /// Identifier maps per context, `*` applies to every context
    pub map: BTreeMap<String, BTreeMap<String, String>>,

    /// Process-wide default discipline; may only switch from sync to async
    #[serde(rename = "async")]
    pub async_mode: Option<bool>,

    /// Prefer the `-dbg` source variant
    pub debug_sources: Option<bool>,

    /// Known prerequisites per resource, fetched early
    pub dep_cache: BTreeMap<String, Vec<String>>,

    /// Modules whose preloaded payload is bypassed
    #[serde(skip)]
    pub ignore_bundled_resources: Option<BundleFilter>,
}

impl ConfigOptions {
    /// Create an empty update
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read options from a JSON file
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LoaderError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Set the base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Register a prefix location
    pub fn with_path(mut self, prefix: impl Into<String>, url: impl Into<String>) -> Self {
        self.paths.insert(prefix.into(), Some(url.into()));
        self
    }

    /// Set the default discipline
    pub fn with_async(mut self, async_mode: bool) -> Self {
        self.async_mode = Some(async_mode);
        self
    }

    /// Register a shim
    pub fn with_shim(mut self, module: impl Into<String>, shim: Shim) -> Self {
        self.shim.insert(module.into(), shim);
        self
    }

    /// Add an identifier map entry for a context
    pub fn with_map(
        mut self,
        context: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.map
            .entry(context.into())
            .or_default()
            .insert(from.into(), to.into());
        self
    }

    /// Toggle debug source variants
    pub fn with_debug_sources(mut self, debug: bool) -> Self {
        self.debug_sources = Some(debug);
        self
    }

    /// Declare known prerequisites of a resource
    pub fn with_dep_cache<I, S>(mut self, resource: impl Into<String>, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dep_cache
            .insert(resource.into(), deps.into_iter().map(Into::into).collect());
        self
    }

    /// Bypass preloaded payloads of modules matching `filter`
    pub fn with_ignore_bundled_resources(mut self, filter: impl Fn(&str) -> bool + 'static) -> Self {
        self.ignore_bundled_resources = Some(BundleFilter::new(filter));
        self
    }
}

/// Read-only view of the effective configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    /// Location of the empty prefix
    pub base_url: String,
    /// Registered prefixes
    pub paths: BTreeMap<String, String>,
    /// Registered shims by resource name
    pub shim: BTreeMap<String, Shim>,
    /// Identifier maps per context
    pub map: BTreeMap<String, BTreeMap<String, String>>,
    /// Process-wide default discipline
    #[serde(rename = "async")]
    pub async_mode: bool,
    /// Debug source variants preferred
    pub debug_sources: bool,
    /// Known prerequisites by resource name
    pub dep_cache: BTreeMap<String, Vec<String>>,
    /// A bundle filter is installed
    pub ignore_bundled_resources: bool,
}

impl ConfigSnapshot {
    /// Pretty JSON rendering
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        let options = ConfigOptions::from_json(
            r#"{
                "baseUrl": "resources/",
                "paths": { "my/app": "./app/", "old": null },
                "shim": { "vendor/jquery": { "exports": "jQuery" } },
                "map": { "*": { "lib": "lib-v2" } },
                "async": true,
                "debugSources": true,
                "depCache": { "my/app/Main.js": ["my/app/util"] }
            }"#,
        )
        .unwrap();

        assert_eq!(options.base_url.as_deref(), Some("resources/"));
        assert_eq!(options.paths.get("old"), Some(&None));
        assert_eq!(options.shim["vendor/jquery"].exports.as_deref(), Some("jQuery"));
        assert_eq!(options.map["*"]["lib"], "lib-v2");
        assert_eq!(options.async_mode, Some(true));
        assert_eq!(options.debug_sources, Some(true));
        assert_eq!(options.dep_cache["my/app/Main.js"], vec!["my/app/util"]);
        assert!(options.ignore_bundled_resources.is_none());
    }

    #[test]
    fn test_missing_options_stay_unset() {
        let options = ConfigOptions::from_json("{}").unwrap();
        assert!(options.base_url.is_none());
        assert!(options.async_mode.is_none());
        assert!(options.paths.is_empty());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            ConfigOptions::from_json("{ not json"),
            Err(LoaderError::Json(_))
        ));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loader.json");
        std::fs::write(&path, r#"{"async": false}"#).unwrap();
        assert_eq!(ConfigOptions::from_path(&path).unwrap().async_mode, Some(false));
        assert!(ConfigOptions::from_path(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_bundle_filter() {
        let options = ConfigOptions::new().with_ignore_bundled_resources(|m| m.starts_with("dev/"));
        let filter = options.ignore_bundled_resources.unwrap();
        assert!(filter.matches("dev/tool.js"));
        assert!(!filter.matches("app/main.js"));
    }
}
