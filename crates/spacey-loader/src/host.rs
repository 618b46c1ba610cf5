// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Script evaluation seam
//!
//! The loader never interprets source text itself. A [`ScriptHost`] runs it in
//! the shared global scope; the script reports its modules by calling
//! [`Loader::define`] on the loader it is handed.

use crate::error::ScriptFault;
use crate::loader::Loader;

/// A piece of fetched source text ready for evaluation
#[derive(Debug, Clone, Copy)]
pub struct Script<'a> {
    /// Canonical name of the module being executed
    pub module: &'a str,
    /// Location the source was fetched from
    pub url: Option<&'a str>,
    /// Source text
    pub source: &'a str,
}

/// Evaluates source text on behalf of the loader
pub trait ScriptHost {
    /// Run `script` to completion
    ///
    /// Faults escaping the script fail the module being executed.
    fn evaluate(&self, loader: &Loader, script: &Script<'_>) -> Result<(), ScriptFault>;
}

impl<F> ScriptHost for F
where
    F: Fn(&Loader, &Script<'_>) -> Result<(), ScriptFault>,
{
    fn evaluate(&self, loader: &Loader, script: &Script<'_>) -> Result<(), ScriptFault> {
        self(loader, script)
    }
}

/// Host for loaders that only ever see preloaded or callable payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScriptHost;

impl ScriptHost for NoScriptHost {
    fn evaluate(&self, _loader: &Loader, script: &Script<'_>) -> Result<(), ScriptFault> {
        Err(ScriptFault::new(format!(
            "no script host available to evaluate {}",
            script.url.unwrap_or(script.module)
        )))
    }
}
