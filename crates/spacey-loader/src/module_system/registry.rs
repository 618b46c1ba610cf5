// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module registry
//!
//! The single table of all known modules, keyed by canonical resource name.
//! There is exactly one entry per name; an entry disappears only through
//! [`Registry::unload`] and a later reference creates it anew.

use crate::error::LoaderError;
use crate::module_system::module::{Module, ModuleState};
use crate::value::Value;
use rustc_hash::{FxHashMap, FxHashSet};

/// Table of modules keyed by canonical name
#[derive(Debug, Default)]
pub struct Registry {
    modules: FxHashMap<String, Module>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the module with this name, creating it in `INITIAL` if unknown
    pub fn get(&mut self, name: &str) -> &mut Module {
        self.modules.entry(name.to_string()).or_insert_with(|| {
            tracing::trace!("registering module '{}'", name);
            Module::new(name)
        })
    }

    /// Get the module without creating it
    pub fn lookup(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Mutable access without creating
    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.modules.get_mut(name)
    }

    /// Check if a module is known
    pub fn has(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Current state, `None` for unknown modules
    pub fn state(&self, name: &str) -> Option<ModuleState> {
        self.modules.get(name).map(Module::state)
    }

    /// Force an untouched module to `READY` with an `undefined` export
    ///
    /// Returns whether the module was declared.
    pub fn declare(&mut self, name: &str) -> bool {
        let module = self.get(name);
        if module.state() != ModuleState::Initial || module.claimed {
            return false;
        }
        tracing::debug!("declaring module '{}'", name);
        module.claimed = true;
        self.ready(name, Value::Undefined);
        true
    }

    /// Finalize a module and every alias with the same content
    ///
    /// Returns the names that were settled.
    pub fn ready(&mut self, name: &str, value: Value) -> Vec<String> {
        let mut settled = Vec::new();
        let mut work = vec![name.to_string()];
        while let Some(current) = work.pop() {
            if let Some(aliases) = self.get(&current).settle_ready(value.clone()) {
                tracing::debug!("module '{}' is ready", current);
                work.extend(aliases);
                settled.push(current);
            }
        }
        settled
    }

    /// Fail a module and every alias with the same error
    ///
    /// Returns the names that were settled.
    pub fn fail(&mut self, name: &str, error: LoaderError) -> Vec<String> {
        let mut settled = Vec::new();
        let mut work = vec![name.to_string()];
        while let Some(current) = work.pop() {
            if let Some(aliases) = self.get(&current).settle_failed(error.clone()) {
                tracing::debug!("module '{}' failed", current);
                work.extend(aliases);
                settled.push(current);
            }
        }
        settled
    }

    /// Make `alias` settle together with `target`
    ///
    /// The alias records the target as its only pending dependency so cycle
    /// detection can walk through it. If the target is already settled, the
    /// alias is settled right away.
    pub fn alias(&mut self, target: &str, alias: &str) {
        if target == alias {
            return;
        }
        tracing::debug!("module '{}' is an alias of '{}'", alias, target);
        {
            let module = self.get(alias);
            module.claimed = true;
            module.pending = vec![target.to_string()];
            if module.state() < ModuleState::Executing {
                module.transition(ModuleState::Executing);
            }
        }

        let target_module = self.get(target);
        target_module.add_alias(alias);
        match target_module.state() {
            ModuleState::Ready => {
                let value = target_module.value();
                self.ready(alias, value);
            }
            ModuleState::Failed => {
                if let Some(err) = target_module.error().cloned() {
                    self.fail(alias, err);
                }
            }
            _ => {}
        }
    }

    /// Whether `from` transitively depends on `target` through pending dependencies
    ///
    /// Iterative depth-first walk, every module is visited at most once.
    pub fn depends_on(&self, from: &str, target: &str) -> bool {
        let mut visited: FxHashSet<&str> = FxHashSet::default();
        let mut stack: Vec<&str> = vec![from];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(module) = self.modules.get(current) else {
                continue;
            };
            for dep in module.pending() {
                if dep == target {
                    return true;
                }
                stack.push(dep.as_str());
            }
        }
        false
    }

    /// Remove modules matching `predicate`
    ///
    /// Unless `all` is set only `PRELOADED` modules are removed. Returns the
    /// removed modules.
    pub fn unload<P>(&mut self, predicate: P, all: bool) -> Vec<Module>
    where
        P: Fn(&Module) -> bool,
    {
        let names: Vec<String> = self
            .modules
            .values()
            .filter(|m| (all || m.state() == ModuleState::Preloaded) && predicate(m))
            .map(|m| m.name().to_string())
            .collect();

        names
            .iter()
            .filter_map(|name| {
                tracing::debug!("unloading module '{}'", name);
                self.modules.remove(name)
            })
            .collect()
    }

    /// Iterate over all modules
    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// Remove every module
    pub fn clear(&mut self) {
        self.modules.clear();
    }

    /// Number of known modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module_system::definition::Payload;

    #[test]
    fn test_get_creates_once() {
        let mut registry = Registry::new();
        registry.get("a.js").transition(ModuleState::Loading);
        assert_eq!(registry.get("a.js").state(), ModuleState::Loading);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_declare_only_untouched() {
        let mut registry = Registry::new();
        assert!(registry.declare("a.js"));
        assert_eq!(registry.state("a.js"), Some(ModuleState::Ready));
        assert!(registry.get("a.js").value().is_undefined());

        registry.get("b.js").transition(ModuleState::Loading);
        assert!(!registry.declare("b.js"));
        assert_eq!(registry.state("b.js"), Some(ModuleState::Loading));
    }

    #[test]
    fn test_ready_propagates_to_aliases() {
        let mut registry = Registry::new();
        registry.alias("real.js", "requested.js");
        registry.alias("requested.js", "other.js");

        let settled = registry.ready("real.js", Value::from("content"));
        assert_eq!(settled.len(), 3);
        assert_eq!(registry.get("other.js").value().as_str(), Some("content"));
    }

    #[test]
    fn test_alias_of_settled_module() {
        let mut registry = Registry::new();
        registry.fail("real.js", LoaderError::Config("boom".into()));
        registry.alias("real.js", "requested.js");
        assert_eq!(registry.state("requested.js"), Some(ModuleState::Failed));
    }

    #[test]
    fn test_depends_on_transitively() {
        let mut registry = Registry::new();
        registry.get("a.js").pending = vec!["b.js".into()];
        registry.get("b.js").pending = vec!["c.js".into(), "d.js".into()];
        registry.get("c.js").pending = vec!["a.js".into()];

        assert!(registry.depends_on("a.js", "c.js"));
        assert!(registry.depends_on("c.js", "b.js"));
        assert!(!registry.depends_on("d.js", "a.js"));
        assert!(!registry.depends_on("unknown.js", "a.js"));
    }

    #[test]
    fn test_unload_preloaded_only() {
        let mut registry = Registry::new();
        registry
            .get("a.js")
            .preload(Payload::Value(Value::Null), "./a.js".into(), Some("g".into()));
        registry
            .get("b.js")
            .preload(Payload::Value(Value::Null), "./b.js".into(), Some("g".into()));
        registry.get("b.js").transition(ModuleState::Loaded);

        let removed = registry.unload(|m| m.group() == Some("g"), false);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].name(), "a.js");
        assert!(registry.has("b.js"));

        let removed = registry.unload(|m| m.name() == "b.js", true);
        assert_eq!(removed.len(), 1);
        assert!(registry.is_empty());
    }
}
