// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The shared global namespace
//!
//! Modules only touch it when they opt in: a definition with the export flag
//! publishes its content under the module's dotted path, a shim reads the
//! value a plain script left behind, and unloading may clear it again.

use crate::value::{Object, Value};

/// Nested object namespace addressed by dotted paths (`sap.m.Button`)
#[derive(Debug, Clone, Default)]
pub struct GlobalScope {
    root: Object,
}

impl GlobalScope {
    /// Create an empty namespace
    pub fn new() -> Self {
        Self::default()
    }

    /// The root object
    pub fn root(&self) -> &Object {
        &self.root
    }

    /// Store `value` at `path`, creating intermediate objects
    ///
    /// A non-object value in the middle of the path is replaced by an object.
    pub fn publish(&self, path: &str, value: Value) {
        let mut segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        let Some(last) = segments.pop() else {
            return;
        };

        let mut current = self.root.clone();
        for segment in segments {
            let next = match current.get(segment) {
                Some(Value::Object(obj)) => obj,
                _ => {
                    let obj = Object::new();
                    current.set(segment, Value::Object(obj.clone()));
                    obj
                }
            };
            current = next;
        }
        tracing::trace!("publishing global '{}'", path);
        current.set(last, value);
    }

    /// Value at `path`
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let mut value = Value::Object(self.root.clone());
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            value = value.as_object()?.get(segment)?;
        }
        Some(value)
    }

    /// Remove the value at `path`, returning it
    pub fn clear(&self, path: &str) -> Option<Value> {
        let (parent, last) = match path.rfind('.') {
            Some(pos) => (self.lookup(&path[..pos])?, &path[pos + 1..]),
            None => (Value::Object(self.root.clone()), path),
        };
        parent.as_object()?.remove(last)
    }

    /// Remove everything
    pub fn reset(&self) {
        for key in self.root.keys() {
            self.root.remove(&key);
        }
    }
}
