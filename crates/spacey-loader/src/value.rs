// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Runtime values exchanged between modules
//!
//! Primitive values compare by value, objects, functions and native handles
//! compare by identity. Module content keeps its identity no matter under how
//! many names the module is requested.

use crate::error::ScriptFault;
use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Signature of a native function value
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, ScriptFault>;

/// A shared, mutable property bag with reference identity
#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<BTreeMap<String, Value>>>);

impl Object {
    /// Create an empty object
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a property
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.borrow().get(key).cloned()
    }

    /// Write a property
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.borrow_mut().insert(key.into(), value);
    }

    /// Delete a property, returning the old value
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.borrow_mut().remove(key)
    }

    /// Whether the property exists
    pub fn has(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    /// Property names in sorted order
    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Whether the object has no properties
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keys only; values may reference the object itself.
        f.debug_set().entries(self.0.borrow().keys()).finish()
    }
}

/// A shared native callable
#[derive(Clone)]
pub struct Function(Rc<NativeFn>);

impl Function {
    /// Wrap a closure
    pub fn new(f: impl Fn(&[Value]) -> Result<Value, ScriptFault> + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Invoke the function
    pub fn call(&self, args: &[Value]) -> Result<Value, ScriptFault> {
        (self.0)(args)
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function]")
    }
}

/// A module-level value
#[derive(Clone, Default)]
pub enum Value {
    /// undefined
    #[default]
    Undefined,
    /// null
    Null,
    /// Boolean value
    Boolean(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(Rc<str>),
    /// Immutable list
    Array(Rc<[Value]>),
    /// Object reference
    Object(Object),
    /// Native function
    Function(Function),
    /// Opaque host value
    Native(Rc<dyn Any>),
}

impl Value {
    /// Create a string value
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Rc::from(s.as_ref()))
    }

    /// Create an array value
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(items.into_iter().collect())
    }

    /// Wrap a closure as a function value
    pub fn function(f: impl Fn(&[Value]) -> Result<Value, ScriptFault> + 'static) -> Self {
        Value::Function(Function::new(f))
    }

    /// Wrap an arbitrary host value
    pub fn native<T: Any>(value: T) -> Self {
        Value::Native(Rc::new(value))
    }

    /// Check for undefined
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Borrow the string contents
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow the array items
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Get the object handle
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get the function handle
    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Downcast a native value
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Native(any) => any.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Strict identity: primitives by value, everything else by reference
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Name of the value's type, used in argument errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Native(_) => "native",
        }
    }

    /// Convert a JSON document into a value
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::string(s),
            serde_json::Value::Array(arr) => Value::array(arr.iter().map(Value::from_json)),
            serde_json::Value::Object(map) => {
                let obj = Object::new();
                for (k, v) in map {
                    obj.set(k.clone(), Value::from_json(v));
                }
                Value::Object(obj)
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(obj) => write!(f, "Object {:?}", obj),
            Value::Function(func) => write!(f, "{:?}", func),
            Value::Native(_) => write!(f, "[native]"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Object(_) => write!(f, "[object Object]"),
            other => write!(f, "{:?}", other),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Value::Object(obj)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_semantics() {
        let obj = Object::new();
        let a = Value::Object(obj.clone());
        let b = Value::Object(obj);
        let c = Value::Object(Object::new());

        assert!(a.same(&b));
        assert!(!a.same(&c));
        assert_eq!(Value::from("x"), Value::from("x"));
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
    }

    #[test]
    fn test_from_json() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"name": "core", "deps": ["a", "b"], "size": 3}"#).unwrap();
        let value = Value::from_json(&json);
        let obj = value.as_object().unwrap();

        assert_eq!(obj.get("name").unwrap().as_str(), Some("core"));
        assert_eq!(obj.get("deps").unwrap().as_array().unwrap().len(), 2);
        assert_eq!(obj.get("size").unwrap().as_number(), Some(3.0));
    }

    #[test]
    fn test_function_call() {
        let double = Value::function(|args| {
            let n = args.first().and_then(Value::as_number).unwrap_or(0.0);
            Ok(Value::Number(n * 2.0))
        });
        let result = double.as_function().unwrap().call(&[Value::Number(21.0)]).unwrap();
        assert_eq!(result.as_number(), Some(42.0));
    }
}
