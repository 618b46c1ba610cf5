// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Source transports
//!
//! A transport turns a resolved location into source text. The loader needs
//! both a blocking flavour for the synchronous discipline and a future for the
//! asynchronous one.
//!
//! - [`MemoryTransport`] - in-memory sources with per-location fetch counters
//! - [`FileTransport`] - files below a root directory
//! - `HttpTransport` - HTTP(S) below a base URL (feature `http`)

mod file;
#[cfg(feature = "http")]
mod http;
mod memory;

pub use file::FileTransport;
#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use memory::MemoryTransport;

use crate::error::TransportError;
use futures::future::LocalBoxFuture;

/// Result of a fetch
pub type FetchResult = Result<String, TransportError>;

/// Fetches module sources
pub trait Transport {
    /// Fetch `url`, blocking the current thread
    fn fetch_blocking(&self, url: &str) -> FetchResult;

    /// Fetch `url` without blocking
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, FetchResult>;
}

impl<T: Transport + ?Sized> Transport for std::rc::Rc<T> {
    fn fetch_blocking(&self, url: &str) -> FetchResult {
        (**self).fetch_blocking(url)
    }

    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, FetchResult> {
        (**self).fetch(url)
    }
}
