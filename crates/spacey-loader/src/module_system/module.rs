// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module records and their lifecycle

use crate::error::LoaderError;
use crate::module_system::definition::Payload;
use crate::runtime::{Deferred, Promise};
use crate::value::{Object, Value};
use serde::Serialize;
use std::fmt;

/// Lifecycle state of a module
///
/// Ordered like the lifecycle; `Preloaded` sorts first because a preloaded
/// module has not started loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModuleState {
    /// Payload attached by a bulk preload, not executed
    Preloaded,
    /// Known by name only
    Initial,
    /// Fetch in progress
    Loading,
    /// Source fetched, not yet run
    Loaded,
    /// Body or factory running, or waiting for dependencies
    Executing,
    /// Content final
    Ready,
    /// Fetch or execution failed
    Failed,
}

impl ModuleState {
    /// All states in lifecycle order
    pub const ALL: [ModuleState; 7] = [
        ModuleState::Preloaded,
        ModuleState::Initial,
        ModuleState::Loading,
        ModuleState::Loaded,
        ModuleState::Executing,
        ModuleState::Ready,
        ModuleState::Failed,
    ];

    /// Whether the state is final
    pub fn is_settled(self) -> bool {
        matches!(self, ModuleState::Ready | ModuleState::Failed)
    }

    /// Whether a request may transition the module from `self` to `next`
    pub fn can_transition_to(self, next: ModuleState) -> bool {
        use ModuleState::*;
        match (self, next) {
            (Ready | Failed, _) => false,
            (Preloaded, Initial | Loaded | Loading | Executing) => true,
            (Preloaded, _) => next.is_settled(),
            (from, to) => to > from,
        }
    }

    /// Upper-case name as shown in diagnostics
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleState::Preloaded => "PRELOADED",
            ModuleState::Initial => "INITIAL",
            ModuleState::Loading => "LOADING",
            ModuleState::Loaded => "LOADED",
            ModuleState::Executing => "EXECUTING",
            ModuleState::Ready => "READY",
            ModuleState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registry entry
#[derive(Debug)]
pub struct Module {
    name: String,
    state: ModuleState,
    /// Resolved location, assigned when loading begins
    pub(crate) url: Option<String>,
    /// Raw payload, dropped once content is materialized
    pub(crate) data: Option<Payload>,
    /// `None` until determined; `Some(Value::Undefined)` is a legitimate export
    content: Option<Value>,
    /// Dependencies requested by the module's own definition
    pub(crate) pending: Vec<String>,
    /// Other names that settle together with this module
    pub(crate) aliases: Vec<String>,
    deferred: Option<Deferred>,
    /// Preload group
    pub(crate) group: Option<String>,
    error: Option<LoaderError>,
    /// A definition or alias has taken responsibility for settling the module
    pub(crate) claimed: bool,
    /// Receptacle handed out for the reserved `exports` dependency
    pub(crate) exports: Option<Object>,
    /// Handle handed out for the reserved `module` dependency
    pub(crate) api: Option<Object>,
    /// Global path this module published its content under
    pub(crate) global_export: Option<String>,
}

impl Module {
    /// Create a module in its initial state
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ModuleState::Initial,
            url: None,
            data: None,
            content: None,
            pending: Vec::new(),
            aliases: Vec::new(),
            deferred: None,
            group: None,
            error: None,
            claimed: false,
            exports: None,
            api: None,
            global_export: None,
        }
    }

    /// Canonical name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state
    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Resolved location
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Preload group
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Failure, once `FAILED`
    pub fn error(&self) -> Option<&LoaderError> {
        self.error.as_ref()
    }

    /// Dependencies the module's definition is waiting for
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    /// Names settled together with this module
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Global path the module's content was published under, if any
    pub fn global_export(&self) -> Option<&str> {
        self.global_export.as_deref()
    }

    /// Whether the module reached a final state
    pub fn is_settled(&self) -> bool {
        self.state.is_settled()
    }

    /// The export; `undefined` unless the module is `READY`
    pub fn value(&self) -> Value {
        match (self.state, &self.content) {
            (ModuleState::Ready, Some(content)) => content.clone(),
            _ => Value::Undefined,
        }
    }

    /// Move to a new non-final state
    ///
    /// Returns false, leaving the state untouched, for transitions the
    /// lifecycle does not allow.
    pub(crate) fn transition(&mut self, next: ModuleState) -> bool {
        if next.is_settled() || !self.state.can_transition_to(next) {
            tracing::debug!(
                "ignoring transition of '{}' from {} to {}",
                self.name,
                self.state,
                next
            );
            return false;
        }
        tracing::trace!("module '{}': {} -> {}", self.name, self.state, next);
        self.state = next;
        true
    }

    /// Attach a bulk-preloaded payload
    pub(crate) fn preload(&mut self, data: Payload, url: String, group: Option<String>) -> bool {
        if self.state != ModuleState::Initial {
            return false;
        }
        self.state = ModuleState::Preloaded;
        self.data = Some(data);
        self.url = Some(url);
        self.group = group;
        true
    }

    /// Drop a preloaded payload so the module is fetched normally
    pub(crate) fn discard_preload(&mut self) {
        if self.state == ModuleState::Preloaded {
            self.state = ModuleState::Initial;
            self.data = None;
            self.group = None;
        }
    }

    /// The promise observed by asynchronous consumers, created lazily
    pub fn promise(&mut self) -> Promise {
        if let Some(deferred) = &self.deferred {
            return deferred.promise();
        }
        let deferred = Deferred::new();
        match self.state {
            ModuleState::Ready => {
                deferred.resolve(self.value());
            }
            ModuleState::Failed => {
                if let Some(err) = &self.error {
                    deferred.reject(err.clone());
                }
            }
            _ => {}
        }
        let promise = deferred.promise();
        self.deferred = Some(deferred);
        promise
    }

    /// Finalize with content; returns the aliases to settle, or `None` if already settled
    pub(crate) fn settle_ready(&mut self, value: Value) -> Option<Vec<String>> {
        if self.is_settled() {
            return None;
        }
        self.state = ModuleState::Ready;
        self.content = Some(value.clone());
        self.data = None;
        self.pending.clear();
        if let Some(deferred) = &self.deferred {
            deferred.resolve(value);
        }
        Some(self.aliases.clone())
    }

    /// Finalize with a failure; returns the aliases to fail, or `None` if already settled
    pub(crate) fn settle_failed(&mut self, error: LoaderError) -> Option<Vec<String>> {
        if self.is_settled() {
            return None;
        }
        self.state = ModuleState::Failed;
        self.data = None;
        self.pending.clear();
        if let Some(deferred) = &self.deferred {
            deferred.reject(error.clone());
        }
        self.error = Some(error);
        Some(self.aliases.clone())
    }

    /// Record another name for this module
    pub(crate) fn add_alias(&mut self, alias: &str) {
        if alias != self.name && !self.aliases.iter().any(|a| a == alias) {
            self.aliases.push(alias.to_string());
        }
    }
}
