// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Registry dumps

use crate::module_system::fetch::ScriptResource;
use crate::module_system::{ModuleState, Registry};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One registry entry
#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
    /// Canonical name
    pub name: String,
    /// Lifecycle state
    pub state: ModuleState,
    /// Resolved location
    pub url: Option<String>,
    /// Preload group
    pub group: Option<String>,
    /// Unsettled dependencies this module waits for
    pub waiting_for: Vec<String>,
    /// Failure message
    pub error: Option<String>,
}

/// An asynchronous fetch in flight
#[derive(Debug, Clone, Serialize)]
pub struct InFlight {
    /// Owning module
    pub module: String,
    /// Location being fetched
    pub url: String,
}

/// Registry entries grouped by state
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    /// Lowest state included
    pub threshold: ModuleState,
    /// Entries per state, sorted by name
    pub modules: BTreeMap<ModuleState, Vec<ModuleReport>>,
    /// Fetches in flight
    pub resources: Vec<InFlight>,
}

impl Diagnostics {
    pub(crate) fn collect(
        registry: &Registry,
        resources: &[ScriptResource],
        threshold: ModuleState,
    ) -> Self {
        let mut modules: BTreeMap<ModuleState, Vec<ModuleReport>> = BTreeMap::new();
        for module in registry.iter().filter(|m| m.state() >= threshold) {
            let waiting_for = match module.state() {
                ModuleState::Loading | ModuleState::Executing => module
                    .pending()
                    .iter()
                    .filter(|dep| registry.state(dep) != Some(ModuleState::Ready))
                    .cloned()
                    .collect(),
                _ => Vec::new(),
            };
            modules.entry(module.state()).or_default().push(ModuleReport {
                name: module.name().to_string(),
                state: module.state(),
                url: module.url().map(str::to_string),
                group: module.group().map(str::to_string),
                waiting_for,
                error: module.error().map(|e| e.to_string()),
            });
        }
        for reports in modules.values_mut() {
            reports.sort_by(|a, b| a.name.cmp(&b.name));
        }

        Self {
            threshold,
            modules,
            resources: resources
                .iter()
                .map(|r| InFlight {
                    module: r.module.clone(),
                    url: r.url.clone(),
                })
                .collect(),
        }
    }

    /// Entries in `state`
    pub fn in_state(&self, state: ModuleState) -> &[ModuleReport] {
        self.modules.get(&state).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Find an entry by canonical name
    pub fn find(&self, name: &str) -> Option<&ModuleReport> {
        self.modules.values().flatten().find(|r| r.name == name)
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.modules.values().map(Vec::len).sum()
    }

    /// Check if no entry matched the threshold
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the dump to the log
    pub fn log(&self) {
        for line in self.to_string().lines() {
            tracing::info!("{}", line);
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---- modules (state >= {}) ----", self.threshold)?;
        for (state, reports) in &self.modules {
            writeln!(f, "{}:", state)?;
            for report in reports {
                write!(f, "  {}", report.name)?;
                if let Some(url) = &report.url {
                    write!(f, " ({})", url)?;
                }
                if let Some(group) = &report.group {
                    write!(f, " [{}]", group)?;
                }
                writeln!(f)?;
                if !report.waiting_for.is_empty() {
                    writeln!(f, "    waiting for: {}", report.waiting_for.join(", "))?;
                }
                if let Some(error) = &report.error {
                    writeln!(f, "    error: {}", error)?;
                }
            }
        }
        if !self.resources.is_empty() {
            writeln!(f, "in flight:")?;
            for resource in &self.resources {
                writeln!(f, "  {} <- {}", resource.module, resource.url)?;
            }
        }
        Ok(())
    }
}
