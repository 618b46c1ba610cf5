// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Queue of definitions whose module name is not known yet
//!
//! In the asynchronous discipline `define` calls are buffered until the
//! resource that made them has finished. The queue is then reconciled against
//! the name of that resource.

use crate::error::LoaderError;
use crate::module_system::definition::Definition;

/// Prefix of names synthesized for definitions that can't be attributed
pub const ANONYMOUS_PREFIX: &str = "~anonymous~";

/// Buffered definitions
#[derive(Debug, Default)]
pub struct DefinitionQueue {
    entries: Vec<Definition>,
    timer_armed: bool,
}

impl DefinitionQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a definition
    ///
    /// Returns true when the caller should arm the fallback timer, which is
    /// once per batch of entries.
    pub fn push(&mut self, definition: Definition) -> bool {
        self.entries.push(definition);
        !std::mem::replace(&mut self.timer_armed, true)
    }

    /// Drain all entries and disarm the timer
    pub fn take(&mut self) -> Vec<Definition> {
        self.timer_armed = false;
        std::mem::take(&mut self.entries)
    }

    /// Number of buffered definitions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries
    pub fn clear(&mut self) {
        self.entries.clear();
        self.timer_armed = false;
    }
}

/// Outcome of reconciling drained definitions against their resource
#[derive(Debug, Default)]
pub struct Reconciled {
    /// Definitions with their final identifier, in queue order
    pub definitions: Vec<(String, Definition)>,
    /// `(target, alias)` pairs: the alias settles together with the target
    pub aliases: Vec<(String, String)>,
    /// Authoring errors found while attributing anonymous definitions
    pub errors: Vec<LoaderError>,
    /// Whether an anonymous definition took the owner's name
    pub owner_claimed: bool,
}

/// Attribute drained definitions to the resource `owner`
///
/// The first anonymous definition takes the owner's name. Every further
/// anonymous definition is ambiguous and gets a synthesized name from
/// `next_anonymous`. When no anonymous definition claims the owner, the owner
/// becomes an alias of the first named definition that differs from it.
/// Declared names are compared as given, so callers pass canonical names.
pub fn reconcile(
    entries: Vec<Definition>,
    owner: Option<&str>,
    mut next_anonymous: impl FnMut() -> String,
) -> Reconciled {
    let mut result = Reconciled::default();
    let mut first_named: Option<String> = None;

    for definition in entries {
        let name = match (&definition.name, owner) {
            (Some(name), _) => {
                if owner != Some(name.as_str()) && first_named.is_none() {
                    first_named = Some(name.clone());
                }
                if owner == Some(name.as_str()) {
                    result.owner_claimed = true;
                }
                name.clone()
            }
            (None, Some(owner)) if !result.owner_claimed => {
                result.owner_claimed = true;
                owner.to_string()
            }
            (None, _) => {
                let fallback = next_anonymous();
                result.errors.push(LoaderError::AmbiguousDefinition {
                    resource: owner.unwrap_or("<unknown>").to_string(),
                    fallback: fallback.clone(),
                });
                fallback
            }
        };
        result.definitions.push((name, definition));
    }

    if let (Some(owner), false, Some(target)) = (owner, result.owner_claimed, first_named) {
        result.aliases.push((target, owner.to_string()));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn counter() -> impl FnMut() -> String {
        let mut n = 0;
        move || {
            n += 1;
            format!("{}{}.js", ANONYMOUS_PREFIX, n)
        }
    }

    #[test]
    fn test_push_arms_timer_once() {
        let mut queue = DefinitionQueue::new();
        assert!(queue.push(Definition::new(Value::Null)));
        assert!(!queue.push(Definition::new(Value::Null)));
        assert_eq!(queue.take().len(), 2);
        assert!(queue.push(Definition::new(Value::Null)));
    }

    #[test]
    fn test_second_anonymous_is_ambiguous() {
        let entries = vec![
            Definition::new(Value::from("x")),
            Definition::new(Value::from("y")),
        ];
        let result = reconcile(entries, Some("x.js"), counter());

        assert_eq!(result.definitions[0].0, "x.js");
        assert_eq!(result.definitions[1].0, "~anonymous~1.js");
        assert!(result.owner_claimed);
        assert!(matches!(
            &result.errors[..],
            [LoaderError::AmbiguousDefinition { resource, .. }] if resource == "x.js"
        ));
    }

    #[test]
    fn test_named_definition_becomes_alias_target() {
        let entries = vec![
            Definition::new(Value::Null).named("lib/real"),
            Definition::new(Value::Null).named("lib/other"),
        ];
        let result = reconcile(entries, Some("lib/requested.js"), counter());

        assert!(!result.owner_claimed);
        assert!(result.errors.is_empty());
        assert_eq!(
            result.aliases,
            vec![("lib/real".to_string(), "lib/requested.js".to_string())]
        );
    }

    #[test]
    fn test_anonymous_claim_prevents_alias() {
        let entries = vec![
            Definition::new(Value::Null).named("lib/helper"),
            Definition::new(Value::Null),
        ];
        let result = reconcile(entries, Some("lib/main.js"), counter());
        assert!(result.owner_claimed);
        assert!(result.aliases.is_empty());
        assert_eq!(result.definitions[1].0, "lib/main.js");
    }

    #[test]
    fn test_without_owner_every_anonymous_is_an_error() {
        let result = reconcile(vec![Definition::new(Value::Null)], None, counter());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.definitions[0].0, "~anonymous~1.js");
    }
}
