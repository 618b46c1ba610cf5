// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module definitions and raw module payloads

use crate::error::{LoaderError, Result, ScriptFault};
use crate::loader::Loader;
use crate::value::{Function, Value};
use std::fmt;
use std::rc::Rc;

/// Body of a module that runs against the loader (a bundled script)
pub type ScriptFn = dyn Fn(&Loader) -> std::result::Result<(), ScriptFault>;

/// Producer of a module's export
#[derive(Clone, Debug)]
pub enum Factory {
    /// The export is the literal value
    Value(Value),
    /// The export is the return value of the function, called with the dependencies
    Function(Function),
}

impl Factory {
    /// Wrap a closure as a factory
    pub fn function(f: impl Fn(&[Value]) -> std::result::Result<Value, ScriptFault> + 'static) -> Self {
        Factory::Function(Function::new(f))
    }
}

impl From<Value> for Factory {
    fn from(value: Value) -> Self {
        match value {
            Value::Function(f) => Factory::Function(f),
            other => Factory::Value(other),
        }
    }
}

/// A single `define` call
#[derive(Clone, Debug)]
pub struct Definition {
    /// Declared module identifier, `None` for anonymous definitions
    pub name: Option<String>,
    /// Dependency identifiers, possibly relative to the module
    pub deps: Vec<String>,
    /// Export producer
    pub factory: Factory,
    /// Publish the export under the module's global path
    pub export: bool,
}

impl Definition {
    /// Anonymous definition without dependencies
    pub fn new(factory: impl Into<Factory>) -> Self {
        Self {
            name: None,
            deps: Vec::new(),
            factory: factory.into(),
            export: false,
        }
    }

    /// Set the declared name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the dependency list
    pub fn deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Request publication on the global namespace
    pub fn exported(mut self, export: bool) -> Self {
        self.export = export;
        self
    }

    /// Interpret the arguments of a script-level `define(name?, deps?, factory, export?)` call
    ///
    /// Name and dependency list are optional and recognized by type.
    pub fn from_args(args: &[Value]) -> Result<Self> {
        let mut args = args.iter().peekable();

        let name = match args.peek() {
            Some(Value::String(s)) => {
                let name = s.to_string();
                args.next();
                Some(name)
            }
            _ => None,
        };

        let deps = match args.peek() {
            Some(Value::Array(items)) => {
                let deps = items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_string).ok_or_else(|| {
                            LoaderError::type_error(format!(
                                "dependency must be a string, got {}",
                                item.type_name()
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                args.next();
                deps
            }
            _ => Vec::new(),
        };

        let factory = match args.next() {
            Some(value) => Factory::from(value.clone()),
            None => return Err(LoaderError::type_error("define() requires a factory")),
        };

        let export = match args.next() {
            None | Some(Value::Undefined) => false,
            Some(Value::Boolean(b)) => *b,
            Some(other) => {
                return Err(LoaderError::type_error(format!(
                    "export flag must be a boolean, got {}",
                    other.type_name()
                )));
            }
        };

        Ok(Self {
            name,
            deps,
            factory,
            export,
        })
    }
}

/// Raw data attached to a module before it is materialized
#[derive(Clone)]
pub enum Payload {
    /// Source text, evaluated by the script host
    Source(String),
    /// A callable module body
    Script(Rc<ScriptFn>),
    /// A definition that only waits for its name
    Definition(Definition),
    /// An already materialized export
    Value(Value),
}

impl Payload {
    /// Wrap a closure as a callable module body
    pub fn script(f: impl Fn(&Loader) -> std::result::Result<(), ScriptFault> + 'static) -> Self {
        Payload::Script(Rc::new(f))
    }

    /// Short description for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Source(_) => "source",
            Payload::Script(_) => "script",
            Payload::Definition(_) => "definition",
            Payload::Value(_) => "value",
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Source(source) => write!(f, "Source({} bytes)", source.len()),
            Payload::Script(_) => write!(f, "Script"),
            Payload::Definition(def) => f.debug_tuple("Definition").field(def).finish(),
            Payload::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}
