// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The loader façade
//!
//! [`Loader`] owns all loader state and exposes the define/require contract.
//! It is a cheap, cloneable handle; clones share the same registry.
//!
//! The loader is single threaded. Everything that completes later (fetches in
//! the asynchronous discipline, dependency settlement, the definition queue
//! timer) is spawned on the current `tokio::task::LocalSet`, so asynchronous
//! use requires running inside one. The synchronous discipline needs no
//! runtime at all.

use crate::config::{BundleFilter, ConfigOptions, ConfigSnapshot};
use crate::diagnostics::Diagnostics;
use crate::error::{LoaderError, Result, ScriptFault};
use crate::globals::GlobalScope;
use crate::host::ScriptHost;
use crate::module_system::exec::ExecFrame;
use crate::module_system::fetch::ScriptResource;
use crate::module_system::resolver::{normalize, to_resource_name};
use crate::module_system::{
    Definition, DefinitionQueue, ModuleState, NameResolver, Payload, Registry, ShimStore,
};
use crate::runtime;
use crate::transport::Transport;
use crate::value::Value;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Continuation invoked with the values of a successful request
pub type SuccessFn = Box<dyn FnOnce(Vec<Value>)>;

/// Continuation invoked with the failure of a request
pub type ErrorFn = Box<dyn FnOnce(LoaderError)>;

/// Mutable loader options
pub(crate) struct Settings {
    pub(crate) resolver: NameResolver,
    pub(crate) shims: ShimStore,
    /// Known prerequisites by resource name
    pub(crate) dep_cache: FxHashMap<String, Vec<String>>,
    pub(crate) async_mode: bool,
    pub(crate) debug_sources: bool,
    pub(crate) ignore_bundled: Option<BundleFilter>,
}

impl Settings {
    fn new() -> Self {
        Self {
            resolver: NameResolver::new(),
            shims: ShimStore::new(),
            dep_cache: FxHashMap::default(),
            async_mode: false,
            debug_sources: false,
            ignore_bundled: None,
        }
    }
}

pub(crate) struct LoaderInner {
    pub(crate) host: Box<dyn ScriptHost>,
    pub(crate) transport: Rc<dyn Transport>,
    pub(crate) registry: RefCell<Registry>,
    pub(crate) settings: RefCell<Settings>,
    pub(crate) queue: RefCell<DefinitionQueue>,
    pub(crate) exec_stack: RefCell<Vec<ExecFrame>>,
    /// `Some(true)` while a synchronous execution runs, `Some(false)` for an asynchronous one
    pub(crate) force_sync: Cell<Option<bool>>,
    pub(crate) anonymous_count: Cell<usize>,
    /// Asynchronous fetches in flight
    pub(crate) resources: RefCell<Vec<ScriptResource>>,
    pub(crate) globals: GlobalScope,
}

/// Selects the modules removed by [`Loader::unload`]
#[derive(Debug, Clone, Copy)]
pub enum UnloadTarget<'a> {
    /// Every module preloaded with this group tag
    Group(&'a str),
    /// A single module identifier
    Module(&'a str),
}

/// Options of [`Loader::unload`]
#[derive(Debug, Clone, Copy, Default)]
pub struct UnloadOptions {
    /// Also remove modules that left the `PRELOADED` state
    pub all: bool,
    /// Clear the global export of removed modules
    pub delete_exports: bool,
}

/// Where a module would be fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLocation {
    /// Canonical resource name
    pub resource: String,
    /// Location of the normal source
    pub url: String,
    /// Location of the debug source variant
    pub debug_url: String,
}

/// Source text fetched without executing it
#[derive(Debug, Clone)]
pub struct FetchedSource {
    /// Canonical resource name
    pub resource: String,
    /// Location that answered
    pub url: String,
    /// Source text
    pub source: String,
}

/// An AMD module loader
#[derive(Clone)]
pub struct Loader {
    pub(crate) inner: Rc<LoaderInner>,
}

impl Loader {
    /// Create a loader in the synchronous discipline with default settings
    pub fn new(transport: impl Transport + 'static, host: impl ScriptHost + 'static) -> Self {
        Self {
            inner: Rc::new(LoaderInner {
                host: Box::new(host),
                transport: Rc::new(transport),
                registry: RefCell::new(Registry::new()),
                settings: RefCell::new(Settings::new()),
                queue: RefCell::new(DefinitionQueue::new()),
                exec_stack: RefCell::new(Vec::new()),
                force_sync: Cell::new(None),
                anonymous_count: Cell::new(0),
                resources: RefCell::new(Vec::new()),
                globals: GlobalScope::new(),
            }),
        }
    }

    /// Create a loader and apply `options`
    pub fn with_options(
        transport: impl Transport + 'static,
        host: impl ScriptHost + 'static,
        options: ConfigOptions,
    ) -> Result<Self> {
        let loader = Self::new(transport, host);
        loader.configure(options)?;
        Ok(loader)
    }

    /// The shared global namespace
    pub fn globals(&self) -> &GlobalScope {
        &self.inner.globals
    }

    /// Whether the process-wide default is the asynchronous discipline
    pub fn is_async(&self) -> bool {
        self.inner.settings.borrow().async_mode
    }

    /// Canonical resource name of `id` as requested from `requester`
    pub fn canonical_name(&self, id: &str, requester: Option<&str>) -> Result<String> {
        self.inner
            .settings
            .borrow()
            .resolver
            .canonical_name(id, requester)
    }

    // ========================================================================
    // Define / require
    // ========================================================================

    /// Define a module
    ///
    /// Inside a synchronous execution, or in the synchronous discipline, the
    /// definition takes effect immediately. Otherwise it is queued until the
    /// resource that made it has finished (or the fallback timer fires).
    pub fn define(&self, definition: Definition) -> Result<()> {
        self.handle_define(definition)
    }

    /// Define a module from script-level arguments `(name?, deps?, factory, export?)`
    pub fn define_args(&self, args: &[Value]) -> Result<()> {
        self.define(Definition::from_args(args)?)
    }

    /// Value of an already loaded module, without triggering a load
    ///
    /// Yields `undefined` unless the module is `READY`.
    pub fn probe(&self, id: &str) -> Result<Value> {
        let name = self.canonical_name(id, None)?;
        Ok(self.probe_canonical(&name))
    }

    pub(crate) fn probe_canonical(&self, name: &str) -> Value {
        self.inner
            .registry
            .borrow()
            .lookup(name)
            .map(|m| m.value())
            .unwrap_or_default()
    }

    /// Load and execute modules, blocking until they are settled
    pub fn require_sync(&self, ids: &[&str]) -> Result<Vec<Value>> {
        let names = self.canonical_names(None, ids)?;
        self.flush_pending_definitions();
        self.require_names_sync(None, &names)
    }

    /// Load and execute modules in the asynchronous discipline
    ///
    /// Loading starts immediately; the future only waits for settlement.
    pub fn require_async(&self, ids: &[&str]) -> LocalBoxFuture<'static, Result<Vec<Value>>> {
        match self.canonical_names(None, ids) {
            Ok(names) => {
                self.flush_pending_definitions();
                self.require_names_async(None, &names)
            }
            Err(err) => futures::future::ready(Err(err)).boxed_local(),
        }
    }

    /// Request modules with continuations, in the process-wide discipline
    ///
    /// Without `on_error` a failure is unhandled: it is returned in the
    /// synchronous discipline and logged as an unhandled rejection in the
    /// asynchronous one.
    pub fn request(
        &self,
        ids: &[&str],
        on_success: Option<SuccessFn>,
        on_error: Option<ErrorFn>,
    ) -> Result<()> {
        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        self.request_from(None, &ids, on_success, on_error)
    }

    pub(crate) fn request_from(
        &self,
        requester: Option<&str>,
        ids: &[String],
        on_success: Option<SuccessFn>,
        on_error: Option<ErrorFn>,
    ) -> Result<()> {
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        let names = match self.canonical_names(requester, &ids) {
            Ok(names) => names,
            Err(err) => return settle_request(Err(err), on_success, on_error),
        };
        if requester.is_none() {
            self.flush_pending_definitions();
        }

        if self.is_async() {
            let waiting = self.require_names_async(requester, &names);
            runtime::spawn(async move {
                if let Err(err) = settle_request(waiting.await, on_success, on_error) {
                    tracing::error!("Uncaught (in promise): {}", err);
                }
            });
            Ok(())
        } else {
            let result = self.require_names_sync(requester, &names);
            settle_request(result, on_success, on_error)
        }
    }

    fn canonical_names(&self, requester: Option<&str>, ids: &[&str]) -> Result<Vec<String>> {
        let settings = self.inner.settings.borrow();
        ids.iter()
            .map(|id| settings.resolver.canonical_name(id, requester))
            .collect()
    }

    /// Top-level requests first attribute definitions left by plain scripts
    fn flush_pending_definitions(&self) {
        let idle = self.inner.exec_stack.borrow().is_empty();
        if idle && !self.inner.queue.borrow().is_empty() {
            self.flush_definitions();
        }
    }

    /// Drain the definition queue without an owning resource
    ///
    /// The fallback timer calls this; anonymous entries get synthesized names.
    /// Returns the authoring errors found.
    pub fn flush_definitions(&self) -> Vec<LoaderError> {
        let entries = self.inner.queue.borrow_mut().take();
        self.process_queue(None, entries)
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Merge runtime options
    ///
    /// Options are validated first; on error nothing is applied.
    pub fn configure(&self, options: ConfigOptions) -> Result<()> {
        if options.async_mode == Some(false) && self.is_async() {
            return Err(LoaderError::Config(
                "can't switch from asynchronous back to synchronous loading".to_string(),
            ));
        }

        let shims = options
            .shim
            .into_iter()
            .map(|(id, shim)| Ok((normalize(&to_resource_name(&id), None)?, shim)))
            .collect::<Result<Vec<_>>>()?;
        let dep_cache = options
            .dep_cache
            .into_iter()
            .map(|(id, deps)| Ok((normalize(&to_resource_name(&id), None)?, deps)))
            .collect::<Result<Vec<_>>>()?;
        for prefix in options.paths.keys() {
            if prefix.starts_with('/') {
                return Err(LoaderError::invalid_path(
                    prefix.clone(),
                    "path prefixes must not start with '/'",
                ));
            }
        }

        let mut settings = self.inner.settings.borrow_mut();
        if let Some(base_url) = &options.base_url {
            settings.resolver.paths.register("", Some(base_url));
        }
        for (prefix, url) in &options.paths {
            settings.resolver.paths.register(prefix, url.as_deref());
        }
        for (name, shim) in shims {
            settings.shims.insert(name, shim);
        }
        for (context, table) in &options.map {
            settings.resolver.maps.merge(context, table);
        }
        for (name, deps) in dep_cache {
            settings.dep_cache.insert(name, deps);
        }
        if let Some(debug) = options.debug_sources {
            settings.debug_sources = debug;
        }
        if let Some(filter) = options.ignore_bundled_resources {
            settings.ignore_bundled = Some(filter);
        }
        if options.async_mode == Some(true) && !settings.async_mode {
            tracing::debug!("switching to asynchronous loading");
            settings.async_mode = true;
        }
        Ok(())
    }

    /// Read-only snapshot of the effective configuration
    pub fn config(&self) -> ConfigSnapshot {
        let settings = self.inner.settings.borrow();
        ConfigSnapshot {
            base_url: settings
                .resolver
                .paths
                .get("")
                .unwrap_or_default()
                .to_string(),
            paths: settings.resolver.paths.to_map(),
            shim: settings.shims.to_map(),
            map: settings.resolver.maps.to_map(),
            async_mode: settings.async_mode,
            debug_sources: settings.debug_sources,
            dep_cache: settings
                .dep_cache
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            ignore_bundled_resources: settings.ignore_bundled.is_some(),
        }
    }

    /// Where a module would be fetched from
    pub fn locate(&self, id: &str) -> Result<ModuleLocation> {
        let resource = self.canonical_name(id, None)?;
        let settings = self.inner.settings.borrow();
        Ok(ModuleLocation {
            url: settings.resolver.resolve_url(&resource),
            debug_url: settings.resolver.resolve_debug_url(&resource),
            resource,
        })
    }

    /// Fetch a module's source with the configured variant preference, without executing it
    pub fn fetch_source(&self, id: &str) -> Result<FetchedSource> {
        let location = self.locate(id)?;
        let candidates = self.source_candidates(&location.resource);
        match self.fetch_candidates_blocking(&candidates) {
            Ok((url, source)) => Ok(FetchedSource {
                resource: location.resource,
                url,
                source,
            }),
            Err((url, source)) => Err(LoaderError::Load {
                module: location.resource,
                url,
                source,
            }),
        }
    }

    // ========================================================================
    // Registry maintenance
    // ========================================================================

    /// Register bundled payloads without executing them
    ///
    /// Modules that are already known are left alone. Returns the number of
    /// payloads attached.
    pub fn preload<I, S>(&self, payloads: I, group: Option<&str>) -> Result<usize>
    where
        I: IntoIterator<Item = (S, Payload)>,
        S: AsRef<str>,
    {
        let mut attached = 0;
        for (id, payload) in payloads {
            let name = normalize(&to_resource_name(id.as_ref()), None)?;
            let url = self.inner.settings.borrow().resolver.resolve_url(&name);
            let mut registry = self.inner.registry.borrow_mut();
            if registry
                .get(&name)
                .preload(payload, url, group.map(str::to_string))
            {
                attached += 1;
            } else {
                tracing::debug!("module '{}' is already known, preload skipped", name);
            }
        }
        tracing::debug!(
            "preloaded {} modules (group {})",
            attached,
            group.unwrap_or("-")
        );
        Ok(attached)
    }

    /// Remove modules from the registry
    ///
    /// A removed module is created afresh by its next reference. Returns the
    /// number of removed modules.
    pub fn unload(&self, target: UnloadTarget<'_>, options: UnloadOptions) -> Result<usize> {
        let removed = match target {
            UnloadTarget::Group(group) => self
                .inner
                .registry
                .borrow_mut()
                .unload(|m| m.group() == Some(group), options.all),
            UnloadTarget::Module(id) => {
                let name = normalize(&to_resource_name(id), None)?;
                self.inner
                    .registry
                    .borrow_mut()
                    .unload(|m| m.name() == name, options.all)
            }
        };

        if options.delete_exports {
            for path in removed.iter().filter_map(|m| m.global_export()) {
                tracing::debug!("clearing global export '{}'", path);
                self.inner.globals.clear(path);
            }
        }
        Ok(removed.len())
    }

    /// Mark an untouched module as `READY` with an `undefined` export
    pub fn declare(&self, id: &str) -> Result<bool> {
        let name = self.canonical_name(id, None)?;
        Ok(self.inner.registry.borrow_mut().declare(&name))
    }

    /// State of a module, `None` if it is unknown
    pub fn state_of(&self, id: &str) -> Option<ModuleState> {
        let name = self.canonical_name(id, None).ok()?;
        self.inner.registry.borrow().state(&name)
    }

    /// Failure recorded for a module
    pub fn error_of(&self, id: &str) -> Option<LoaderError> {
        let name = self.canonical_name(id, None).ok()?;
        self.inner
            .registry
            .borrow()
            .lookup(&name)
            .and_then(|m| m.error().cloned())
    }

    /// Registry entries at or above `threshold`, grouped by state
    pub fn dump(&self, threshold: ModuleState) -> Diagnostics {
        Diagnostics::collect(
            &self.inner.registry.borrow(),
            &self.inner.resources.borrow(),
            threshold,
        )
    }

    /// Forget all modules, queued definitions and globals; configuration is kept
    pub fn reset(&self) {
        tracing::debug!("resetting loader state");
        self.inner.registry.borrow_mut().clear();
        self.inner.queue.borrow_mut().clear();
        self.inner.exec_stack.borrow_mut().clear();
        self.inner.resources.borrow_mut().clear();
        self.inner.force_sync.set(None);
        self.inner.anonymous_count.set(0);
        self.inner.globals.reset();
    }

    /// Attribute a fault that escaped normal execution to a module
    ///
    /// The module is looked up by the faulting location if one is given,
    /// otherwise the module currently executing is blamed. Returns the name
    /// of the failed module.
    pub fn report_fault(&self, url: Option<&str>, fault: ScriptFault) -> Option<String> {
        let by_url = url.and_then(|url| {
            self.inner
                .registry
                .borrow()
                .iter()
                .find(|m| m.url() == Some(url) && !m.is_settled())
                .map(|m| m.name().to_string())
        });
        let target = by_url.or_else(|| {
            self.inner
                .exec_stack
                .borrow()
                .last()
                .map(|frame| frame.module.clone())
        });

        match target {
            Some(name) => {
                let fault = self.with_synthesized_stack(&name, fault);
                let err = LoaderError::Execution {
                    module: name.clone(),
                    source: fault,
                };
                tracing::error!("{}", err);
                self.fail_module(&name, err);
                Some(name)
            }
            None => {
                tracing::error!("unattributed script fault: {}", fault);
                None
            }
        }
    }

    pub(crate) fn fail_module(&self, name: &str, error: LoaderError) {
        self.inner.registry.borrow_mut().fail(name, error);
    }

    pub(crate) fn next_anonymous_name(&self) -> String {
        let n = self.inner.anonymous_count.get() + 1;
        self.inner.anonymous_count.set(n);
        format!("{}{}.js", crate::module_system::queue::ANONYMOUS_PREFIX, n)
    }
}

fn settle_request(
    result: Result<Vec<Value>>,
    on_success: Option<SuccessFn>,
    on_error: Option<ErrorFn>,
) -> Result<()> {
    match (result, on_error) {
        (Ok(values), _) => {
            if let Some(on_success) = on_success {
                on_success(values);
            }
            Ok(())
        }
        (Err(err), Some(on_error)) => {
            on_error(err);
            Ok(())
        }
        (Err(err), None) => Err(err),
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("modules", &self.inner.registry.borrow().len())
            .field("async", &self.is_async())
            .finish()
    }
}
