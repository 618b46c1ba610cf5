// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # spacey-loader
//!
//! An AMD module loader runtime for the Spacey JavaScript engine.
//!
//! The loader discovers, fetches, orders, executes and caches a graph of
//! named modules without a build step:
//!
//! - `define(name?, deps?, factory, export?)` and `require(names)` semantics
//! - Synchronous (blocking) and asynchronous (promise based) disciplines,
//!   usable side by side
//! - Cycle detection that breaks circular dependencies with `undefined`
//! - Anonymous definitions named after the resource that loaded them
//! - Prefix paths, context-sensitive identifier maps, shims, bulk preloads
//!   and debug source variants
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spacey_loader::{Definition, Loader, MemoryTransport, NoScriptHost, Value};
//!
//! let loader = Loader::new(MemoryTransport::new(), NoScriptHost);
//! loader.define(Definition::new(Value::from("world")).named("greeting"))?;
//! let values = loader.require_sync(&["greeting"])?;
//! assert_eq!(values[0].as_str(), Some("world"));
//! ```
//!
//! ## Asynchronous loading
//!
//! Asynchronous work is spawned on the current `tokio::task::LocalSet`:
//!
//! ```rust,ignore
//! let local = tokio::task::LocalSet::new();
//! local.run_until(async {
//!     loader.configure(ConfigOptions::new().with_async(true))?;
//!     let values = loader.require_async(&["my/app/Main"]).await?;
//!     Ok::<_, LoaderError>(())
//! }).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod globals;
pub mod host;
pub mod loader;
pub mod module_system;
pub mod runtime;
pub mod transport;
pub mod value;

// Re-exports
pub use config::{BundleFilter, ConfigOptions, ConfigSnapshot};
pub use diagnostics::{Diagnostics, ModuleReport};
pub use error::{LoaderError, Result, ScriptFault, TransportError};
pub use globals::GlobalScope;
pub use host::{NoScriptHost, Script, ScriptHost};
pub use loader::{
    ErrorFn, FetchedSource, Loader, ModuleLocation, SuccessFn, UnloadOptions, UnloadTarget,
};
pub use module_system::{Definition, Factory, ModuleState, Payload, Shim};
pub use runtime::{Deferred, Promise};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{FileTransport, MemoryTransport, Transport};
pub use value::{Function, Object, Value};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
