// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Cooperative scheduling primitives
//!
//! The loader is single threaded. Asynchronous work (fetch completion,
//! dependency settlement, the definition queue timer) is scheduled on the
//! current `tokio::task::LocalSet`.

mod promise;

pub use promise::{Deferred, Promise, PromiseState};

use crate::error::LoaderError;
use crate::value::Value;
use std::future::Future;

/// Schedule a task on the current local set
///
/// Panics when called outside of a `LocalSet`, like `tokio::task::spawn_local`.
pub(crate) fn spawn<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    drop(tokio::task::spawn_local(future));
}

/// Whether a tokio runtime is driving the current thread
pub(crate) fn is_available() -> bool {
    tokio::runtime::Handle::try_current().is_ok()
}

/// Run a future in the background and expose its outcome as a promise
pub(crate) fn promise_from<F>(future: F) -> Promise
where
    F: Future<Output = Result<Value, LoaderError>> + 'static,
{
    let deferred = Deferred::new();
    let promise = deferred.promise();
    spawn(async move {
        match future.await {
            Ok(value) => deferred.resolve(value),
            Err(err) => deferred.reject(err),
        };
    });
    promise
}
