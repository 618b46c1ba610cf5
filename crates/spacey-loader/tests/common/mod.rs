// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Shared fixtures for loader integration tests
//!
//! Module sources served by the [`MemoryTransport`] are keys into a
//! [`TestHost`], which runs the Rust closure registered for that key.

#![allow(dead_code)]

use spacey_loader::{Loader, MemoryTransport, Script, ScriptFault, ScriptHost};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

type Body = Rc<dyn Fn(&Loader) -> Result<(), ScriptFault>>;

#[derive(Default)]
struct HostState {
    scripts: HashMap<String, Body>,
    evaluations: HashMap<String, usize>,
}

/// Script host running registered closures; clones share their registrations
#[derive(Clone, Default)]
pub struct TestHost {
    state: Rc<RefCell<HostState>>,
}

impl TestHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the body run for `source`
    pub fn script(&self, source: &str, body: impl Fn(&Loader) -> Result<(), ScriptFault> + 'static) {
        self.state
            .borrow_mut()
            .scripts
            .insert(source.to_string(), Rc::new(body));
    }

    /// Number of evaluations of the given module
    pub fn evaluations(&self, module: &str) -> usize {
        self.state
            .borrow()
            .evaluations
            .get(module)
            .copied()
            .unwrap_or(0)
    }
}

impl ScriptHost for TestHost {
    fn evaluate(&self, loader: &Loader, script: &Script<'_>) -> Result<(), ScriptFault> {
        let body = {
            let mut state = self.state.borrow_mut();
            *state
                .evaluations
                .entry(script.module.to_string())
                .or_default() += 1;
            state.scripts.get(script.source).cloned()
        };
        match body {
            Some(body) => body(loader),
            None => Err(ScriptFault::new(format!("unknown script '{}'", script.source))),
        }
    }
}

/// A loader over an in-memory transport and a closure host
pub struct Fixture {
    pub loader: Loader,
    pub transport: MemoryTransport,
    pub host: TestHost,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let transport = MemoryTransport::new();
        let host = TestHost::new();
        let loader = Loader::new(transport.clone(), host.clone());
        Self {
            loader,
            transport,
            host,
        }
    }

    /// Serve a module at `url` whose evaluation runs `body`
    pub fn module(
        &self,
        url: &str,
        body: impl Fn(&Loader) -> Result<(), ScriptFault> + 'static,
    ) {
        self.transport.insert(url, url);
        self.host.script(url, body);
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("spacey_loader=debug")
        .with_test_writer()
        .try_init();
}
