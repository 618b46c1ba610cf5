// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! HTTP transport

use super::{FetchResult, Transport};
use crate::error::TransportError;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use std::cell::OnceCell;
use url::Url;

/// User agent sent with every request
const USER_AGENT: &str = concat!("spacey-loader/", env!("CARGO_PKG_VERSION"));

/// Fetches sources over HTTP(S), locations are joined onto a base URL
///
/// The blocking client is created on first use. Blocking fetches must not be
/// issued from inside an async runtime worker.
pub struct HttpTransport {
    base: Url,
    client: reqwest::Client,
    blocking: OnceCell<reqwest::blocking::Client>,
}

impl HttpTransport {
    /// Create a transport for locations below `base`
    pub fn new(base: &str) -> Result<Self, TransportError> {
        let base = Url::parse(base)
            .map_err(|e| TransportError::new(base, format!("invalid base URL: {}", e)))?;
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::new(base.as_str(), e.to_string()))?;
        Ok(Self {
            base,
            client,
            blocking: OnceCell::new(),
        })
    }

    /// The base URL
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Absolute URL of a location
    pub fn url_of(&self, location: &str) -> Result<Url, TransportError> {
        self.base
            .join(location)
            .map_err(|e| TransportError::new(location, format!("invalid URL: {}", e)))
    }

    fn blocking_client(&self) -> Result<&reqwest::blocking::Client, TransportError> {
        if let Some(client) = self.blocking.get() {
            return Ok(client);
        }
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::new(self.base.as_str(), e.to_string()))?;
        Ok(self.blocking.get_or_init(|| client))
    }
}

impl Transport for HttpTransport {
    fn fetch_blocking(&self, url: &str) -> FetchResult {
        let target = self.url_of(url)?;
        tracing::debug!("GET {}", target);
        let response = self
            .blocking_client()?
            .get(target)
            .send()
            .map_err(|e| TransportError::new(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::status(
                url,
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
            ));
        }
        response
            .text()
            .map_err(|e| TransportError::new(url, e.to_string()))
    }

    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, FetchResult> {
        let client = self.client.clone();
        let location = url.to_string();
        let target = self.url_of(url);
        async move {
            let target = target?;
            tracing::debug!("GET {}", target);
            let response = client
                .get(target)
                .send()
                .await
                .map_err(|e| TransportError::new(&location, e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::status(
                    &location,
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown"),
                ));
            }
            response
                .text()
                .await
                .map_err(|e| TransportError::new(&location, e.to_string()))
        }
        .boxed_local()
    }
}
