// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module name and path resolution
//!
//! Module identifiers are `/`-separated (`sap/m/Button`). The canonical
//! registry key is the resource name, the identifier plus its `.js` suffix.
//! Identifiers are turned into locations by longest-prefix lookup in the
//! registered resource paths, and rewritten by context-sensitive maps.

use crate::error::{LoaderError, Result};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// File suffix of script modules
pub const JS_SUFFIX: &str = ".js";

/// Suffix inserted before the extension to address the debug source variant
pub const DEBUG_VARIANT: &str = "-dbg";

/// Default location of the empty prefix
pub const DEFAULT_BASE_URL: &str = "./";

/// Compound suffixes that belong to the resource type rather than the name
const SUBTYPES: &[&str] = &[
    ".controller.js",
    ".fragment.js",
    ".view.js",
    ".designtime.js",
    ".support.js",
];

/// Name of the context table that applies to every requester
pub const WILDCARD_CONTEXT: &str = "*";

/// Resolve `.` and `..` segments of `name` against the identifier `base`
///
/// Only a leading dot segment makes a name relative. Empty segments are
/// dropped when the name contains dot segments.
pub fn normalize(name: &str, base: Option<&str>) -> Result<String> {
    if name.starts_with('/') {
        return Err(LoaderError::invalid_path(
            name,
            "module names must not start with '/'",
        ));
    }

    let Some(first_dot) = find_dot_segment(name) else {
        return Ok(name.to_string());
    };

    let joined = if first_dot == 0 {
        let Some(base) = base else {
            return Err(LoaderError::invalid_path(
                name,
                "relative name not supported without a base module",
            ));
        };
        let package = match base.rfind('/') {
            Some(pos) => &base[..=pos],
            None => "",
        };
        format!("{}{}", package, name)
    } else {
        name.to_string()
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        if !segment.is_empty() && !segment.bytes().all(|b| b == b'.') {
            segments.push(segment);
            continue;
        }
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(LoaderError::invalid_path(
                        joined.clone(),
                        "can't navigate to parent of root",
                    ));
                }
            }
            _ => {
                return Err(LoaderError::invalid_path(
                    joined.clone(),
                    format!("illegal path segment '{}'", segment),
                ));
            }
        }
    }
    Ok(segments.join("/"))
}

/// Byte offset of the first segment made only of dots
fn find_dot_segment(name: &str) -> Option<usize> {
    let mut offset = 0;
    for segment in name.split('/') {
        if !segment.is_empty() && segment.bytes().all(|b| b == b'.') {
            return Some(offset);
        }
        offset += segment.len() + 1;
    }
    None
}

/// Append the script suffix unless present
pub fn to_resource_name(id: &str) -> String {
    if id.ends_with(JS_SUFFIX) {
        id.to_string()
    } else {
        format!("{}{}", id, JS_SUFFIX)
    }
}

/// Split a resource name into its base identifier and type suffix
pub fn split_extension(resource: &str) -> (&str, &str) {
    for subtype in SUBTYPES {
        if let Some(base) = resource.strip_suffix(subtype) {
            return (base, &resource[base.len()..]);
        }
    }
    let last_segment = resource.rfind('/').map(|p| p + 1).unwrap_or(0);
    match resource[last_segment..].rfind('.') {
        Some(dot) if dot > 0 => resource.split_at(last_segment + dot),
        _ => (resource, ""),
    }
}

/// Module identifier of a resource name (`a/b.js` -> `a/b`)
pub fn to_module_id(resource: &str) -> &str {
    resource.strip_suffix(JS_SUFFIX).unwrap_or(resource)
}

/// Global namespace path of a resource name (`a/b/c.js` -> `a.b.c`)
pub fn to_global_path(resource: &str) -> String {
    to_module_id(resource).replace('/', ".")
}

/// Identifier prefix to base location table
#[derive(Debug, Clone)]
pub struct ResourcePaths {
    prefixes: FxHashMap<String, String>,
}

impl ResourcePaths {
    /// Create a table with only the default empty prefix
    pub fn new() -> Self {
        let mut prefixes = FxHashMap::default();
        prefixes.insert(String::new(), DEFAULT_BASE_URL.to_string());
        Self { prefixes }
    }

    /// Register or remove (with `None`) a prefix
    ///
    /// The empty prefix can't be removed; removing it restores the default.
    pub fn register(&mut self, prefix: &str, url: Option<&str>) {
        let prefix = prefix.trim_end_matches('/');
        match url {
            Some(url) => {
                let url = if url.ends_with('/') || url.is_empty() {
                    url.to_string()
                } else {
                    format!("{}/", url)
                };
                self.prefixes.insert(prefix.to_string(), url);
            }
            None if prefix.is_empty() => {
                self.prefixes
                    .insert(String::new(), DEFAULT_BASE_URL.to_string());
            }
            None => {
                self.prefixes.remove(prefix);
            }
        }
    }

    /// Location registered for exactly this prefix
    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    /// All registered prefixes
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.prefixes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Location of a resource, `variant` is inserted before the type suffix
    pub fn resolve(&self, resource: &str, variant: &str) -> String {
        let (id, suffix) = split_extension(resource);
        let segments: Vec<&str> = id.split('/').collect();

        for len in (0..=segments.len()).rev() {
            let prefix = segments[..len].join("/");
            if let Some(base) = self.prefixes.get(&prefix) {
                let mut location = base.clone();
                if len < segments.len() {
                    location.push_str(&segments[len..].join("/"));
                }
                if location.ends_with('/') {
                    location.pop();
                }
                location.push_str(variant);
                location.push_str(suffix);
                return location;
            }
        }
        unreachable!("the empty prefix is always registered")
    }
}

impl Default for ResourcePaths {
    fn default() -> Self {
        Self::new()
    }
}

/// Context-sensitive identifier rewriting tables
#[derive(Debug, Clone, Default)]
pub struct ModuleMaps {
    maps: FxHashMap<String, FxHashMap<String, String>>,
}

impl ModuleMaps {
    /// Create an empty set of tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge entries into the table of a context
    pub fn merge(&mut self, context: &str, table: &BTreeMap<String, String>) {
        let entries = self.maps.entry(context.to_string()).or_default();
        for (from, to) in table {
            entries.insert(from.clone(), to.clone());
        }
    }

    /// All tables
    pub fn to_map(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        self.maps
            .iter()
            .map(|(ctx, table)| {
                (
                    ctx.clone(),
                    table.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                )
            })
            .collect()
    }

    /// The most specific table for a requesting resource
    fn table_for_context(&self, context: Option<&str>) -> Option<&FxHashMap<String, String>> {
        let context = to_module_id(context?);
        let mut end = context.len();
        loop {
            if let Some(table) = self.maps.get(&context[..end]) {
                return Some(table);
            }
            match context[..end].rfind('/') {
                Some(pos) if pos > 0 => end = pos,
                _ => return None,
            }
        }
    }

    /// Rewrite a resource name as seen from `context`
    ///
    /// The context's own table is searched first, the wildcard table second.
    pub fn map_identifier(&self, resource: &str, context: Option<&str>) -> String {
        if self.maps.is_empty() {
            return resource.to_string();
        }
        let (id, suffix) = split_extension(resource);
        let tables = [
            self.table_for_context(context),
            self.maps.get(WILDCARD_CONTEXT),
        ];
        for table in tables.into_iter().flatten() {
            if let Some(mapped) = longest_prefix_rewrite(table, id) {
                return format!("{}{}", mapped, suffix);
            }
        }
        resource.to_string()
    }
}

fn longest_prefix_rewrite(table: &FxHashMap<String, String>, id: &str) -> Option<String> {
    let mut end = id.len();
    loop {
        if let Some(target) = table.get(&id[..end]) {
            return Some(format!("{}{}", target, &id[end..]));
        }
        match id[..end].rfind('/') {
            Some(pos) if pos > 0 => end = pos,
            _ => return None,
        }
    }
}

/// Combined name resolution: normalization, mapping and location lookup
#[derive(Debug, Clone, Default)]
pub struct NameResolver {
    /// Prefix to location table
    pub paths: ResourcePaths,
    /// Identifier maps
    pub maps: ModuleMaps,
}

impl NameResolver {
    /// Create a resolver with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical resource name of a dependency identifier requested by `requester`
    pub fn canonical_name(&self, id: &str, requester: Option<&str>) -> Result<String> {
        let resource = normalize(&to_resource_name(id), requester)?;
        Ok(self.maps.map_identifier(&resource, requester))
    }

    /// Location of a resource
    pub fn resolve_url(&self, resource: &str) -> String {
        self.paths.resolve(resource, "")
    }

    /// Location of the debug variant of a resource
    pub fn resolve_debug_url(&self, resource: &str) -> String {
        self.paths.resolve(resource, DEBUG_VARIANT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_relative() {
        assert_eq!(normalize("./b.js", Some("a/x.js")).unwrap(), "a/b.js");
        assert_eq!(normalize("../c/d.js", Some("a/b/x.js")).unwrap(), "a/c/d.js");
        assert_eq!(normalize("a/./b/../c.js", None).unwrap(), "a/c.js");
        assert_eq!(normalize("plain/name.js", None).unwrap(), "plain/name.js");
        assert_eq!(normalize("./top.js", Some("root.js")).unwrap(), "top.js");
    }

    #[test]
    fn test_normalize_errors() {
        assert!(matches!(
            normalize("./b.js", None),
            Err(LoaderError::InvalidPath { .. })
        ));
        assert!(normalize("../b.js", Some("x.js")).is_err());
        assert!(normalize("a/.../b.js", None).is_err());
        assert!(normalize("/abs/b.js", None).is_err());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let base = Some("sap/m/Button.js");
        for name in ["./Label.js", "../ui/core/Core.js", "sap/./m/../m/Text.js", "x/y.js"] {
            let once = normalize(name, base).unwrap();
            assert_eq!(normalize(&once, base).unwrap(), once, "name {}", name);
        }
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("a/b.js"), ("a/b", ".js"));
        assert_eq!(split_extension("a/b.controller.js"), ("a/b", ".controller.js"));
        assert_eq!(split_extension("a.b/c"), ("a.b/c", ""));
        assert_eq!(to_global_path("sap/m/Button.js"), "sap.m.Button");
    }

    #[test]
    fn test_resolve_longest_prefix() {
        let mut paths = ResourcePaths::new();
        paths.register("", Some("resources"));
        paths.register("my/app", Some("./app/"));
        paths.register("my/app/lib", Some("https://cdn.example.com/lib"));

        assert_eq!(paths.resolve("other/x.js", ""), "resources/other/x.js");
        assert_eq!(paths.resolve("my/app/Main.js", ""), "./app/Main.js");
        assert_eq!(
            paths.resolve("my/app/lib/util.js", DEBUG_VARIANT),
            "https://cdn.example.com/lib/util-dbg.js"
        );
        assert_eq!(paths.resolve("my/application.js", ""), "resources/my/application.js");
    }

    #[test]
    fn test_unknown_module_uses_default_base() {
        let paths = ResourcePaths::new();
        assert_eq!(paths.resolve("unknown/mod.js", ""), "./unknown/mod.js");
    }

    #[test]
    fn test_register_full_name() {
        let mut paths = ResourcePaths::new();
        paths.register("vendor/jquery", Some("./thirdparty/jquery-3"));
        assert_eq!(paths.resolve("vendor/jquery.js", ""), "./thirdparty/jquery-3.js");

        paths.register("vendor/jquery", None);
        assert_eq!(paths.resolve("vendor/jquery.js", ""), "./vendor/jquery.js");
    }

    #[test]
    fn test_map_identifier() {
        let mut maps = ModuleMaps::new();
        maps.merge(
            "*",
            &BTreeMap::from([("lib".to_string(), "lib-v1".to_string())]),
        );
        maps.merge(
            "my/app",
            &BTreeMap::from([("lib".to_string(), "lib-v2".to_string())]),
        );

        assert_eq!(maps.map_identifier("lib/util.js", None), "lib-v1/util.js");
        assert_eq!(
            maps.map_identifier("lib/util.js", Some("my/app/views/Main.js")),
            "lib-v2/util.js"
        );
        assert_eq!(
            maps.map_identifier("lib/util.js", Some("other/Main.js")),
            "lib-v1/util.js"
        );
        assert_eq!(maps.map_identifier("library.js", None), "library.js");
    }

    #[test]
    fn test_canonical_name() {
        let resolver = NameResolver::new();
        assert_eq!(
            resolver.canonical_name("./Label", Some("sap/m/Button.js")).unwrap(),
            "sap/m/Label.js"
        );
        assert!(resolver.canonical_name("/sap/m/Label", None).is_err());
    }
}
