// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! File system transport

use super::{FetchResult, Transport};
use crate::error::TransportError;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use std::io;
use std::path::{Path, PathBuf};

/// Reads sources from files below a root directory
///
/// Locations are interpreted relative to the root, `./` prefixes are dropped.
#[derive(Debug, Clone)]
pub struct FileTransport {
    root: PathBuf,
}

impl FileTransport {
    /// Serve files below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path of a location
    pub fn path_of(&self, url: &str) -> PathBuf {
        let relative = url.strip_prefix("file://").unwrap_or(url);
        let relative = relative.trim_start_matches("./");
        let path = Path::new(relative);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

fn map_io_error(url: &str, err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::NotFound => TransportError::status(url, 404, "Not Found"),
        io::ErrorKind::PermissionDenied => TransportError::status(url, 403, "Forbidden"),
        _ => TransportError::new(url, err.to_string()),
    }
}

impl Transport for FileTransport {
    fn fetch_blocking(&self, url: &str) -> FetchResult {
        let path = self.path_of(url);
        tracing::trace!("reading {}", path.display());
        std::fs::read_to_string(&path).map_err(|e| map_io_error(url, e))
    }

    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, FetchResult> {
        let path = self.path_of(url);
        let url = url.to_string();
        async move {
            tracing::trace!("reading {}", path.display());
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| map_io_error(&url, e))
        }
        .boxed_local()
    }
}
