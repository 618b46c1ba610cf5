// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! In-memory transport

use super::{FetchResult, Transport};
use crate::error::TransportError;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Default)]
struct MemoryState {
    sources: FxHashMap<String, String>,
    fetches: FxHashMap<String, usize>,
    /// Remaining forced failures per location
    failures: FxHashMap<String, usize>,
}

/// Serves sources from a map; clones share the same contents and counters
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `source` at `url`
    pub fn insert(&self, url: impl Into<String>, source: impl Into<String>) {
        self.state
            .borrow_mut()
            .sources
            .insert(url.into(), source.into());
    }

    /// Stop serving `url`
    pub fn remove(&self, url: &str) -> Option<String> {
        self.state.borrow_mut().sources.remove(url)
    }

    /// Make the next `times` fetches of `url` fail with a server error
    pub fn fail_times(&self, url: impl Into<String>, times: usize) {
        self.state.borrow_mut().failures.insert(url.into(), times);
    }

    /// Number of fetches of `url` so far, including failed ones
    pub fn fetch_count(&self, url: &str) -> usize {
        self.state.borrow().fetches.get(url).copied().unwrap_or(0)
    }

    /// Number of fetches of any location
    pub fn total_fetches(&self) -> usize {
        self.state.borrow().fetches.values().sum()
    }
}

impl Transport for MemoryTransport {
    fn fetch_blocking(&self, url: &str) -> FetchResult {
        let mut state = self.state.borrow_mut();
        *state.fetches.entry(url.to_string()).or_default() += 1;

        if let Some(remaining) = state.failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransportError::status(url, 503, "Service Unavailable"));
            }
        }

        match state.sources.get(url) {
            Some(source) => Ok(source.clone()),
            None => Err(TransportError::status(url, 404, "Not Found")),
        }
    }

    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, FetchResult> {
        let this = self.clone();
        let url = url.to_string();
        async move {
            // Complete on a later turn, like a real network callback.
            tokio::task::yield_now().await;
            this.fetch_blocking(&url)
        }
        .boxed_local()
    }
}
