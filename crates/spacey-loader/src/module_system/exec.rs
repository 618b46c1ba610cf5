// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module execution and definition handling
//!
//! Execution keeps an explicit stack of frames. An anonymous definition made
//! while a module executes belongs to the top frame, once. The stack is also
//! what synthesized stack traces are built from.

use crate::error::{LoaderError, Result, ScriptFault};
use crate::host::Script;
use crate::loader::Loader;
use crate::module_system::definition::{Definition, Factory, Payload};
use crate::module_system::deps::{EXPORTS, MODULE, is_reserved};
use crate::module_system::module::ModuleState;
use crate::module_system::queue;
use crate::module_system::resolver::to_global_path;
use crate::runtime;
use crate::value::Value;

/// One level of the execution stack
#[derive(Debug, Clone)]
pub(crate) struct ExecFrame {
    pub(crate) module: String,
    /// An anonymous definition already took this frame's name
    pub(crate) consumed: bool,
    /// AMD definitions are ignored (shim with `amd: true`)
    pub(crate) suppress_amd: bool,
    /// First named definition that differs from the module
    pub(crate) first_named: Option<String>,
}

impl ExecFrame {
    fn new(module: &str, suppress_amd: bool) -> Self {
        Self {
            module: module.to_string(),
            consumed: false,
            suppress_amd,
            first_named: None,
        }
    }
}

impl Loader {
    /// Run a `LOADED` module's payload
    ///
    /// Faults fail the module; in the synchronous discipline they are also
    /// returned. A fault raised after the module became `READY` is only
    /// logged, so every request sees the same content.
    pub(crate) fn execute_module(&self, name: &str, sync: bool) -> Result<()> {
        let (data, url) = {
            let mut registry = self.inner.registry.borrow_mut();
            let Some(module) = registry.lookup_mut(name) else {
                return Ok(());
            };
            if module.state() != ModuleState::Loaded {
                return Ok(());
            }
            module.transition(ModuleState::Executing);
            (module.data.take(), module.url.clone())
        };
        let suppress_amd = self.inner.settings.borrow().shims.suppresses_amd(name);
        tracing::debug!("executing '{}'", name);

        self.inner
            .exec_stack
            .borrow_mut()
            .push(ExecFrame::new(name, suppress_amd));
        let saved_queue = std::mem::take(&mut *self.inner.queue.borrow_mut());
        let saved_force = self.inner.force_sync.replace(Some(sync));

        let outcome = match data {
            Some(Payload::Source(source)) => self.inner.host.evaluate(
                self,
                &Script {
                    module: name,
                    url: url.as_deref(),
                    source: &source,
                },
            ),
            Some(Payload::Script(body)) => body(self),
            Some(Payload::Definition(definition)) => self
                .define_module(name.to_string(), definition, sync)
                .map_err(ScriptFault::from),
            Some(Payload::Value(value)) => {
                let mut registry = self.inner.registry.borrow_mut();
                registry.get(name).claimed = true;
                registry.ready(name, value);
                Ok(())
            }
            None => Ok(()),
        };

        let outcome = outcome.map_err(|fault| self.with_synthesized_stack(name, fault));
        let queued = std::mem::replace(&mut *self.inner.queue.borrow_mut(), saved_queue).take();
        self.inner.force_sync.set(saved_force);
        let frame = self.inner.exec_stack.borrow_mut().pop();

        match outcome {
            Ok(()) => {
                self.process_queue(Some(name), queued);
                self.finish_execution(name, frame);
                if sync {
                    if let Some(err) = self.inner.registry.borrow().lookup(name).and_then(|m| m.error()) {
                        return Err(err.clone());
                    }
                }
                Ok(())
            }
            Err(fault) => {
                if !queued.is_empty() {
                    tracing::debug!(
                        "dropping {} queued definitions of failed module '{}'",
                        queued.len(),
                        name
                    );
                }
                let (state, recorded) = self
                    .inner
                    .registry
                    .borrow()
                    .lookup(name)
                    .map(|m| (Some(m.state()), m.error().cloned()))
                    .unwrap_or((None, None));
                if state == Some(ModuleState::Ready) {
                    // The content is final; a late fault can't fail the module.
                    tracing::error!(
                        "module '{}' faulted after its definition settled: {}",
                        name,
                        fault
                    );
                    return Ok(());
                }
                let err = match recorded {
                    Some(err) => err,
                    None => {
                        let err = LoaderError::Execution {
                            module: name.to_string(),
                            source: fault,
                        };
                        log_execution_error(&err);
                        self.fail_module(name, err.clone());
                        err
                    }
                };
                if sync { Err(err) } else { Ok(()) }
            }
        }
    }

    /// Settle a module whose body ran without claiming it
    ///
    /// A named definition seen during execution makes the module its alias;
    /// otherwise the shim export (or `undefined`) becomes the content.
    fn finish_execution(&self, name: &str, frame: Option<ExecFrame>) {
        let unclaimed = self
            .inner
            .registry
            .borrow()
            .lookup(name)
            .is_some_and(|m| !m.is_settled() && !m.claimed);
        if !unclaimed {
            return;
        }

        if let Some(target) = frame.and_then(|frame| frame.first_named) {
            self.inner.registry.borrow_mut().alias(&target, name);
            return;
        }

        let export_path = self
            .inner
            .settings
            .borrow()
            .shims
            .exports(name)
            .map(str::to_string);
        let value = export_path
            .as_deref()
            .and_then(|path| self.inner.globals.lookup(path))
            .unwrap_or_default();
        let mut registry = self.inner.registry.borrow_mut();
        let module = registry.get(name);
        module.claimed = true;
        module.global_export = export_path;
        registry.ready(name, value);
    }

    /// Attach a stack trace built from the execution stack if the fault has none
    pub(crate) fn with_synthesized_stack(&self, name: &str, fault: ScriptFault) -> ScriptFault {
        if fault.stack.is_some() {
            return fault;
        }
        let stack = self.inner.exec_stack.borrow();
        let mut trace = format!("{}\n    at {}", fault.message, name);
        for frame in stack.iter().rev().filter(|frame| frame.module != name) {
            trace.push_str("\n    at ");
            trace.push_str(&frame.module);
        }
        drop(stack);
        fault.with_stack(trace)
    }

    /// Route a `define` call to immediate definition or to the queue
    pub(crate) fn handle_define(&self, mut definition: Definition) -> Result<()> {
        let declared = match &definition.name {
            Some(id) => Some(self.canonical_name(id, None)?),
            None => None,
        };

        if let Some(frame) = self.inner.exec_stack.borrow().last() {
            if frame.suppress_amd {
                tracing::debug!(
                    "ignoring AMD definition inside shimmed module '{}'",
                    frame.module
                );
                return Ok(());
            }
        }

        let queued = match self.inner.force_sync.get() {
            Some(sync) => !sync,
            None => self.is_async(),
        };
        if queued {
            definition.name = declared;
            let arm = self.inner.queue.borrow_mut().push(definition)
                && self.inner.exec_stack.borrow().is_empty();
            if arm && runtime::is_available() {
                let loader = self.clone();
                runtime::spawn(async move {
                    tokio::task::yield_now().await;
                    loader.flush_definitions();
                });
            } else if arm {
                tracing::warn!(
                    "no runtime to flush queued definitions, they wait for the next request"
                );
            }
            return Ok(());
        }

        let name = {
            let mut stack = self.inner.exec_stack.borrow_mut();
            match (declared, stack.last_mut()) {
                (Some(name), Some(frame)) => {
                    if name == frame.module {
                        frame.consumed = true;
                    } else if !frame.consumed && frame.first_named.is_none() {
                        frame.first_named = Some(name.clone());
                    }
                    name
                }
                (Some(name), None) => name,
                (None, Some(frame)) if !frame.consumed => {
                    frame.consumed = true;
                    frame.module.clone()
                }
                (None, frame) => {
                    let resource = frame
                        .map(|frame| frame.module.clone())
                        .unwrap_or_else(|| "<unknown>".to_string());
                    let fallback = self.next_anonymous_name();
                    tracing::error!(
                        "{}",
                        LoaderError::AmbiguousDefinition {
                            resource,
                            fallback: fallback.clone(),
                        }
                    );
                    fallback
                }
            }
        };
        self.define_module(name, definition, true)
    }

    /// Attribute drained queue entries to `owner` and define them
    ///
    /// Returns the authoring errors found.
    pub(crate) fn process_queue(
        &self,
        owner: Option<&str>,
        entries: Vec<Definition>,
    ) -> Vec<LoaderError> {
        if entries.is_empty() {
            return Vec::new();
        }
        tracing::trace!(
            "processing {} queued definitions for {}",
            entries.len(),
            owner.unwrap_or("<none>")
        );

        let reconciled = queue::reconcile(entries, owner, || self.next_anonymous_name());
        let mut errors = reconciled.errors;
        for err in &errors {
            tracing::error!("{}", err);
        }
        for (name, definition) in reconciled.definitions {
            if let Err(err) = self.define_module(name, definition, false) {
                errors.push(err);
            }
        }
        for (target, alias) in reconciled.aliases {
            self.inner.registry.borrow_mut().alias(&target, &alias);
        }
        errors
    }

    /// Register a definition under its final name and resolve its dependencies
    pub(crate) fn define_module(&self, name: String, definition: Definition, sync: bool) -> Result<()> {
        {
            let mut registry = self.inner.registry.borrow_mut();
            let module = registry.get(&name);
            if module.is_settled() || module.claimed {
                tracing::warn!(
                    "module '{}' is already defined ({}), ignoring repeated definition",
                    name,
                    module.state()
                );
                return Ok(());
            }
            module.claimed = true;
            if module.state() < ModuleState::Executing {
                module.transition(ModuleState::Executing);
            }
        }

        let deps = match self.canonical_deps(&name, &definition.deps) {
            Ok(deps) => deps,
            Err(err) => {
                tracing::error!("invalid dependency of '{}': {}", name, err);
                self.fail_module(&name, err.clone());
                return Err(err);
            }
        };
        self.inner.registry.borrow_mut().get(&name).pending =
            deps.iter().filter(|dep| !is_reserved(dep)).cloned().collect();
        tracing::debug!("defining '{}' with dependencies {:?}", name, deps);

        if sync {
            let values = match self.resolve_all_sync(Some(&name), &deps) {
                Ok(values) => values,
                Err(err) => {
                    let err = LoaderError::dependency_failed(&name, err);
                    tracing::error!("{}", err);
                    self.fail_module(&name, err.clone());
                    return Err(err);
                }
            };
            return self.finish_definition(&name, &definition, &deps, values);
        }

        let waiting = self.resolve_all_async(Some(&name), &deps);
        let loader = self.clone();
        runtime::spawn(async move {
            match waiting.await {
                Ok(values) => {
                    // Factory faults are recorded on the module.
                    let _ = loader.finish_definition(&name, &definition, &deps, values);
                }
                Err(err) => {
                    let err = LoaderError::dependency_failed(&name, err);
                    tracing::error!("{}", err);
                    loader.fail_module(&name, err);
                }
            }
        });
        Ok(())
    }

    /// Run the factory and make its result the module's content
    fn finish_definition(
        &self,
        name: &str,
        definition: &Definition,
        deps: &[String],
        values: Vec<Value>,
    ) -> Result<()> {
        let produced = match &definition.factory {
            Factory::Value(value) => Ok(value.clone()),
            Factory::Function(factory) => factory.call(&values),
        };

        let mut value = match produced {
            Ok(value) => value,
            Err(fault) => {
                let err = LoaderError::Execution {
                    module: name.to_string(),
                    source: self.with_synthesized_stack(name, fault),
                };
                log_execution_error(&err);
                self.fail_module(name, err.clone());
                return Err(err);
            }
        };

        if value.is_undefined() && deps.iter().any(|dep| dep == EXPORTS || dep == MODULE) {
            let registry = self.inner.registry.borrow();
            if let Some(module) = registry.lookup(name) {
                value = module
                    .api
                    .as_ref()
                    .and_then(|api| api.get("exports"))
                    .or_else(|| module.exports.clone().map(Value::Object))
                    .unwrap_or_default();
            }
        }

        let mut registry = self.inner.registry.borrow_mut();
        if definition.export && !registry.get(name).is_settled() {
            let path = to_global_path(name);
            self.inner.globals.publish(&path, value.clone());
            registry.get(name).global_export = Some(path);
        }
        registry.ready(name, value);
        Ok(())
    }
}

fn log_execution_error(err: &LoaderError) {
    match err {
        LoaderError::Execution { module, source } => {
            tracing::error!(
                "failed to execute module '{}': {}\n{}",
                module,
                source.message,
                source.stack.as_deref().unwrap_or("")
            );
        }
        other => tracing::error!("{}", other),
    }
}
