// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! AMD module system
//!
//! ## Components
//! - Name/path resolution (`resolver`)
//! - Module records and their lifecycle (`module`)
//! - The module registry (`registry`)
//! - Shims for modules that don't self-describe (`shim`)
//! - The definition queue (`queue`)
//! - Dependency resolution with cycle detection (`deps`)
//! - Fetching sources (`fetch`)
//! - Execution and definition handling (`exec`)

pub mod definition;
pub(crate) mod deps;
pub(crate) mod exec;
pub(crate) mod fetch;
pub mod module;
pub mod queue;
pub mod registry;
pub mod resolver;
pub mod shim;

pub use definition::{Definition, Factory, Payload, ScriptFn};
pub use deps::{EXPORTS, MODULE, REQUIRE, is_reserved};
pub use module::{Module, ModuleState};
pub use queue::{DefinitionQueue, Reconciled, reconcile};
pub use registry::Registry;
pub use resolver::{ModuleMaps, NameResolver, ResourcePaths, normalize};
pub use shim::{Shim, ShimStore};
