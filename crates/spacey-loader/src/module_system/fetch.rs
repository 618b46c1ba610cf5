// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Fetching module sources
//!
//! The synchronous path blocks on the transport and tries the debug variant
//! before the normal one. The asynchronous path starts a tracked resource
//! load that is retried exactly once before the module fails.

use crate::error::{LoaderError, Result, TransportError};
use crate::loader::Loader;
use crate::module_system::definition::Payload;
use crate::module_system::module::ModuleState;
use crate::runtime;

/// An asynchronous fetch in flight, tagged with its owning module
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScriptResource {
    pub(crate) module: String,
    pub(crate) url: String,
}

impl Loader {
    /// Locations to try for a module, in order of preference
    pub(crate) fn source_candidates(&self, name: &str) -> Vec<String> {
        let settings = self.inner.settings.borrow();
        let url = settings.resolver.resolve_url(name);
        if settings.debug_sources {
            vec![settings.resolver.resolve_debug_url(name), url]
        } else {
            vec![url]
        }
    }

    /// Fetch the first candidate that answers
    ///
    /// On failure the error of the last attempt is returned with its location.
    pub(crate) fn fetch_candidates_blocking(
        &self,
        candidates: &[String],
    ) -> std::result::Result<(String, String), (String, TransportError)> {
        let mut last_error = None;
        for url in candidates {
            match self.inner.transport.fetch_blocking(url) {
                Ok(source) => return Ok((url.clone(), source)),
                Err(err) => {
                    tracing::debug!("fetching {} failed: {}", url, err.message);
                    last_error = Some((url.clone(), err));
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            (
                String::new(),
                TransportError::new("", "no location to fetch from"),
            )
        }))
    }

    /// Start loading a module that is `INITIAL`
    ///
    /// Synchronous loads leave the module `LOADED` or `FAILED` and report the
    /// failure. Asynchronous loads return immediately.
    pub(crate) fn load_module(&self, name: &str, sync: bool) -> Result<()> {
        let candidates = self.source_candidates(name);
        {
            let mut registry = self.inner.registry.borrow_mut();
            let module = registry.get(name);
            if !module.transition(ModuleState::Loading) {
                return Ok(());
            }
            module.url = candidates.first().cloned();
        }
        tracing::debug!(
            "loading '{}' {}",
            name,
            if sync { "synchronously" } else { "asynchronously" }
        );

        self.prefetch_dep_cache(name, sync);

        if !sync {
            self.load_async(name, candidates);
            return Ok(());
        }

        match self.fetch_candidates_blocking(&candidates) {
            Ok((url, source)) => {
                let mut registry = self.inner.registry.borrow_mut();
                let module = registry.get(name);
                module.url = Some(url);
                module.data = Some(Payload::Source(source));
                module.transition(ModuleState::Loaded);
                Ok(())
            }
            Err((url, source)) => {
                let err = LoaderError::Load {
                    module: name.to_string(),
                    url,
                    source,
                };
                tracing::error!("{}", err);
                self.fail_module(name, err.clone());
                Err(err)
            }
        }
    }

    /// Request the declared prerequisites of a module early
    ///
    /// The hints only save round trips. Failures are logged and otherwise
    /// left to the module's own definition.
    fn prefetch_dep_cache(&self, name: &str, sync: bool) {
        let hints = match self.inner.settings.borrow().dep_cache.get(name) {
            Some(hints) => hints.clone(),
            None => return,
        };
        for hint in hints {
            let dep = match self.canonical_name(&hint, Some(name)) {
                Ok(dep) => dep,
                Err(err) => {
                    tracing::warn!("ignoring dependency hint '{}' of '{}': {}", hint, name, err);
                    continue;
                }
            };
            tracing::trace!("prefetching '{}' for '{}'", dep, name);
            if sync {
                if let Err(err) = self.require_module_sync(Some(name), &dep, false) {
                    tracing::debug!("prefetch of '{}' failed: {}", dep, err);
                }
            } else {
                drop(self.require_module_async(Some(name), &dep, false));
            }
        }
    }

    fn track_resource(&self, name: &str, url: &str) {
        self.inner.resources.borrow_mut().push(ScriptResource {
            module: name.to_string(),
            url: url.to_string(),
        });
    }

    fn untrack_resource(&self, name: &str, url: &str) {
        self.inner
            .resources
            .borrow_mut()
            .retain(|r| !(r.module == name && r.url == url));
    }

    /// Fetch in the background, retrying once
    ///
    /// The retry targets the next candidate, or the same location when there
    /// is only one.
    fn load_async(&self, name: &str, candidates: Vec<String>) {
        let Some(primary) = candidates.first().cloned() else {
            return;
        };
        let fallback = candidates.get(1).cloned().unwrap_or_else(|| primary.clone());

        self.track_resource(name, &primary);
        let loader = self.clone();
        let name = name.to_string();
        runtime::spawn(async move {
            let transport = loader.inner.transport.clone();
            let mut url = primary;
            let mut result = transport.fetch(&url).await;

            if let Err(err) = &result {
                tracing::warn!(
                    "loading '{}' from {} failed ({}), retrying from {}",
                    name,
                    url,
                    err.message,
                    fallback
                );
                loader.untrack_resource(&name, &url);
                url = fallback;
                loader.track_resource(&name, &url);
                result = transport.fetch(&url).await;
            }
            loader.untrack_resource(&name, &url);

            match result {
                Ok(source) => loader.on_source_loaded(&name, url, source),
                Err(source) => {
                    let err = LoaderError::Load {
                        module: name.clone(),
                        url,
                        source,
                    };
                    tracing::error!("{}", err);
                    loader.fail_module(&name, err);
                }
            }
        });
    }

    fn on_source_loaded(&self, name: &str, url: String, source: String) {
        {
            let mut registry = self.inner.registry.borrow_mut();
            let Some(module) = registry.lookup_mut(name) else {
                tracing::debug!("module '{}' was unloaded while loading", name);
                return;
            };
            if module.state() != ModuleState::Loading {
                tracing::debug!(
                    "ignoring source of '{}', module is already {}",
                    name,
                    module.state()
                );
                return;
            }
            module.url = Some(url);
            module.data = Some(Payload::Source(source));
            module.transition(ModuleState::Loaded);
        }
        // Execution failures are recorded on the module.
        let _ = self.execute_module(name, false);
    }
}
