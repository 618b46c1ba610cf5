// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Dependency resolution
//!
//! Requests for single modules in both disciplines, and resolution of whole
//! dependency lists including the reserved `require`, `module` and `exports`
//! dependencies.

use crate::error::{LoaderError, Result, ScriptFault};
use crate::loader::{ErrorFn, Loader, SuccessFn};
use crate::module_system::module::ModuleState;
use crate::module_system::resolver::to_module_id;
use crate::runtime::{self, Promise};
use crate::value::{Function, Object, Value};
use futures::FutureExt;
use futures::future::{LocalBoxFuture, try_join_all};
use std::rc::Rc;

/// Dependency resolving to a requester scoped `require`
pub const REQUIRE: &str = "require";
/// Dependency resolving to the module handle `{id, exports}`
pub const MODULE: &str = "module";
/// Dependency resolving to the module's export receptacle
pub const EXPORTS: &str = "exports";

/// Whether `dep` names one of the reserved dependencies
pub fn is_reserved(dep: &str) -> bool {
    matches!(dep, REQUIRE | MODULE | EXPORTS)
}

impl Loader {
    /// Canonical names of a dependency list; reserved names are kept as they are
    pub(crate) fn canonical_deps(&self, requester: &str, deps: &[String]) -> Result<Vec<String>> {
        let settings = self.inner.settings.borrow();
        deps.iter()
            .map(|dep| {
                if is_reserved(dep) {
                    Ok(dep.clone())
                } else {
                    settings.resolver.canonical_name(dep, Some(requester))
                }
            })
            .collect()
    }

    /// Value of a reserved dependency for `requester`
    fn reserved_value(&self, requester: &str, dep: &str) -> Option<Value> {
        match dep {
            REQUIRE => Some(self.local_require(requester)),
            MODULE => Some(Value::Object(self.module_api(requester))),
            EXPORTS => Some(Value::Object(self.module_exports(requester))),
            _ => None,
        }
    }

    pub(crate) fn module_exports(&self, name: &str) -> Object {
        let mut registry = self.inner.registry.borrow_mut();
        registry
            .get(name)
            .exports
            .get_or_insert_with(Object::new)
            .clone()
    }

    pub(crate) fn module_api(&self, name: &str) -> Object {
        let exports = self.module_exports(name);
        let mut registry = self.inner.registry.borrow_mut();
        registry
            .get(name)
            .api
            .get_or_insert_with(|| {
                let api = Object::new();
                api.set("id", Value::string(to_module_id(name)));
                api.set("exports", Value::Object(exports));
                api
            })
            .clone()
    }

    /// A `require` function resolving identifiers relative to `requester`
    ///
    /// Called with a string it probes; called with an array and optional
    /// success and error callbacks it issues a request.
    pub(crate) fn local_require(&self, requester: &str) -> Value {
        let weak = Rc::downgrade(&self.inner);
        let requester = requester.to_string();
        Value::function(move |args| {
            let Some(inner) = weak.upgrade() else {
                return Err(ScriptFault::new("the loader is gone"));
            };
            let loader = Loader { inner };
            match args.first() {
                Some(Value::String(id)) => {
                    let name = loader.canonical_name(id, Some(&requester))?;
                    Ok(loader.probe_canonical(&name))
                }
                Some(Value::Array(items)) => {
                    let ids = items
                        .iter()
                        .map(|item| {
                            item.as_str().map(str::to_string).ok_or_else(|| {
                                ScriptFault::new(format!(
                                    "module name must be a string, got {}",
                                    item.type_name()
                                ))
                            })
                        })
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    let on_success = args.get(1).and_then(Value::as_function).cloned();
                    let on_error = args.get(2).and_then(Value::as_function).cloned();
                    loader.request_from(
                        Some(&requester),
                        &ids,
                        on_success.map(success_callback),
                        on_error.map(error_callback),
                    )?;
                    Ok(Value::Undefined)
                }
                Some(other) => Err(ScriptFault::new(format!(
                    "require expects a module name or an array of names, got {}",
                    other.type_name()
                ))),
                None => Err(ScriptFault::new("require expects a module name")),
            }
        })
    }

    /// Clone the bundle filter out so user code never runs under a borrow
    fn ignores_bundle(&self, name: &str) -> bool {
        let filter = self.inner.settings.borrow().ignore_bundled.clone();
        filter.is_some_and(|filter| filter.matches(name))
    }

    /// State of a module that is about to be requested, creating it if needed
    fn prepare_request(&self, name: &str) -> ModuleState {
        let ignore = self.ignores_bundle(name);
        let mut registry = self.inner.registry.borrow_mut();
        let module = registry.get(name);
        if ignore && module.state() == ModuleState::Preloaded {
            tracing::debug!("ignoring bundled payload of '{}'", name);
            module.discard_preload();
        }
        module.state()
    }

    fn settled_result(&self, name: &str) -> Result<Value> {
        let registry = self.inner.registry.borrow();
        match registry.lookup(name) {
            Some(module) => match module.error() {
                Some(err) => Err(err.clone()),
                None => Ok(module.value()),
            },
            None => Ok(Value::Undefined),
        }
    }

    /// Shim dependencies of a module, canonicalized and recorded as pending
    fn shim_deps(&self, name: &str) -> Result<Vec<String>> {
        let deps = self.inner.settings.borrow().shims.deps(name).to_vec();
        if deps.is_empty() {
            return Ok(deps);
        }
        let deps = self.canonical_deps(name, &deps)?;
        self.inner.registry.borrow_mut().get(name).pending = deps.clone();
        Ok(deps)
    }

    /// Request a module in the synchronous discipline
    pub(crate) fn require_module_sync(
        &self,
        requester: Option<&str>,
        name: &str,
        skip_shim: bool,
    ) -> Result<Value> {
        match self.prepare_request(name) {
            ModuleState::Ready | ModuleState::Failed => {}
            state @ (ModuleState::Loading | ModuleState::Executing) => {
                tracing::warn!(
                    "synchronous request of '{}'{} while it is {}, returning undefined",
                    name,
                    requester.map(|r| format!(" from '{}'", r)).unwrap_or_default(),
                    state
                );
                return Ok(Value::Undefined);
            }
            ModuleState::Preloaded | ModuleState::Loaded => {
                self.inner
                    .registry
                    .borrow_mut()
                    .get(name)
                    .transition(ModuleState::Loaded);
                self.execute_module(name, true)?;
            }
            ModuleState::Initial => {
                if !skip_shim {
                    let deps = self.shim_deps(name).inspect_err(|err| {
                        self.fail_module(name, err.clone());
                    })?;
                    if !deps.is_empty() {
                        if let Err(err) = self.resolve_all_sync(Some(name), &deps) {
                            let err = LoaderError::dependency_failed(name, err);
                            tracing::error!("{}", err);
                            self.fail_module(name, err.clone());
                            return Err(err);
                        }
                        return self.require_module_sync(requester, name, true);
                    }
                }
                self.load_module(name, true)?;
                self.execute_module(name, true)?;
            }
        }
        self.settled_result(name)
    }

    /// Request a module in the asynchronous discipline
    pub(crate) fn require_module_async(
        &self,
        requester: Option<&str>,
        name: &str,
        skip_shim: bool,
    ) -> Promise {
        match self.prepare_request(name) {
            ModuleState::Ready => Promise::resolved(self.probe_canonical(name)),
            ModuleState::Failed => self.inner.registry.borrow_mut().get(name).promise(),
            ModuleState::Loading | ModuleState::Executing => {
                if let Some(requester) = requester {
                    if self.inner.registry.borrow().depends_on(name, requester) {
                        tracing::debug!(
                            "cycle detected between '{}' and '{}', returning undefined for '{}'",
                            requester,
                            name,
                            name
                        );
                        return Promise::resolved(Value::Undefined);
                    }
                }
                self.inner.registry.borrow_mut().get(name).promise()
            }
            ModuleState::Preloaded | ModuleState::Loaded => {
                let promise = {
                    let mut registry = self.inner.registry.borrow_mut();
                    let module = registry.get(name);
                    module.transition(ModuleState::Loaded);
                    module.promise()
                };
                // Failures are recorded on the module and reach the promise.
                let _ = self.execute_module(name, false);
                promise
            }
            ModuleState::Initial => {
                if !skip_shim {
                    let deps = match self.shim_deps(name) {
                        Ok(deps) => deps,
                        Err(err) => {
                            self.fail_module(name, err);
                            return self.inner.registry.borrow_mut().get(name).promise();
                        }
                    };
                    if !deps.is_empty() {
                        let waiting = self.resolve_all_async(Some(name), &deps);
                        let loader = self.clone();
                        let name = name.to_string();
                        let requester = requester.map(str::to_string);
                        return runtime::promise_from(async move {
                            if let Err(err) = waiting.await {
                                let err = LoaderError::dependency_failed(&name, err);
                                tracing::error!("{}", err);
                                loader.fail_module(&name, err.clone());
                                return Err(err);
                            }
                            loader
                                .require_module_async(requester.as_deref(), &name, true)
                                .await
                        });
                    }
                }
                let promise = self.inner.registry.borrow_mut().get(name).promise();
                // Asynchronous loads report their failures through the module.
                let _ = self.load_module(name, false);
                promise
            }
        }
    }

    /// Resolve a dependency list, blocking; the first failure is returned
    pub(crate) fn resolve_all_sync(
        &self,
        requester: Option<&str>,
        deps: &[String],
    ) -> Result<Vec<Value>> {
        deps.iter()
            .map(|dep| {
                match requester.and_then(|requester| self.reserved_value(requester, dep)) {
                    Some(value) => Ok(value),
                    None => self.require_module_sync(requester, dep, false),
                }
            })
            .collect()
    }

    /// Resolve a dependency list in the asynchronous discipline
    ///
    /// All requests are issued in declaration order before this returns; the
    /// future waits for all of them and fails with the first failure.
    pub(crate) fn resolve_all_async(
        &self,
        requester: Option<&str>,
        deps: &[String],
    ) -> LocalBoxFuture<'static, Result<Vec<Value>>> {
        let promises: Vec<Promise> = deps
            .iter()
            .map(|dep| {
                match requester.and_then(|requester| self.reserved_value(requester, dep)) {
                    Some(value) => Promise::resolved(value),
                    None => self.require_module_async(requester, dep, false),
                }
            })
            .collect();
        async move { try_join_all(promises).await }.boxed_local()
    }

    pub(crate) fn require_names_sync(
        &self,
        requester: Option<&str>,
        names: &[String],
    ) -> Result<Vec<Value>> {
        names
            .iter()
            .map(|name| self.require_module_sync(requester, name, false))
            .collect()
    }

    pub(crate) fn require_names_async(
        &self,
        requester: Option<&str>,
        names: &[String],
    ) -> LocalBoxFuture<'static, Result<Vec<Value>>> {
        let promises: Vec<Promise> = names
            .iter()
            .map(|name| self.require_module_async(requester, name, false))
            .collect();
        async move { try_join_all(promises).await }.boxed_local()
    }
}

fn success_callback(callback: Function) -> SuccessFn {
    Box::new(move |values: Vec<Value>| {
        if let Err(fault) = callback.call(&values) {
            tracing::error!("require callback failed: {}", fault);
        }
    })
}

fn error_callback(callback: Function) -> ErrorFn {
    Box::new(move |err: LoaderError| {
        if let Err(fault) = callback.call(&[Value::string(err.to_string())]) {
            tracing::error!("require error callback failed: {}", fault);
        }
    })
}
