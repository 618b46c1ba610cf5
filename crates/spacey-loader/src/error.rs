// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the module loader

use thiserror::Error;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// A fault raised while running script code (a module body or a factory)
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ScriptFault {
    /// Message of the original fault
    pub message: String,
    /// Stack trace, either supplied by the script host or synthesized by the loader
    pub stack: Option<String>,
}

impl ScriptFault {
    /// Create a fault without a stack trace
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    /// Attach a stack trace
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl From<LoaderError> for ScriptFault {
    fn from(err: LoaderError) -> Self {
        Self::new(err.to_string())
    }
}

/// A transport-level fetch failure
#[derive(Debug, Clone, Error)]
#[error("request for {url} failed: {message}")]
pub struct TransportError {
    /// The requested location
    pub url: String,
    /// HTTP-like status code, when the transport has one
    pub status: Option<u16>,
    /// Human readable reason
    pub message: String,
}

impl TransportError {
    /// Create a transport error without a status code
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Create a transport error carrying a status code
    pub fn status(url: impl Into<String>, status: u16, reason: &str) -> Self {
        Self {
            url: url.into(),
            status: Some(status),
            message: format!("{} - {}", status, reason),
        }
    }

    /// Whether the resource simply does not exist
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

/// Errors that can occur while resolving, loading or executing modules
///
/// Errors are cloneable so that one failure can be handed to every consumer
/// waiting on the failed module.
#[derive(Debug, Clone, Error)]
pub enum LoaderError {
    /// Malformed relative identifier
    #[error("Invalid module path '{path}': {reason}")]
    InvalidPath {
        /// The offending identifier
        path: String,
        /// Reason for rejection
        reason: String,
    },

    /// The source of a module could not be fetched
    #[error("failed to load '{module}' from {url}: {source}")]
    Load {
        /// Canonical module name
        module: String,
        /// Location of the last attempt
        url: String,
        /// Transport fault
        #[source]
        source: TransportError,
    },

    /// Running the module body or its factory raised a fault
    #[error("failed to execute module '{module}': {source}")]
    Execution {
        /// Canonical module name
        module: String,
        /// The original fault
        #[source]
        source: ScriptFault,
    },

    /// A dependency of the module failed
    #[error("failed to resolve dependencies of '{module}': {source}")]
    DependencyFailed {
        /// The module whose dependencies failed
        module: String,
        /// The failure of the dependency
        #[source]
        source: Box<LoaderError>,
    },

    /// More than one anonymous definition resolved against a single resource
    #[error("anonymous module definition in '{resource}' cannot be attributed, registered as '{fallback}'")]
    AmbiguousDefinition {
        /// The loading resource, if any
        resource: String,
        /// Synthesized substitute name
        fallback: String,
    },

    /// Invalid configuration change
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid arguments to a definition or request call
    #[error("TypeError: {0}")]
    TypeError(String),

    /// JSON configuration could not be parsed
    #[error("JSON parse error: {0}")]
    Json(String),
}

impl LoaderError {
    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Wrap a dependency failure with the context of the depending module
    pub fn dependency_failed(module: impl Into<String>, cause: LoaderError) -> Self {
        Self::DependencyFailed {
            module: module.into(),
            source: Box::new(cause),
        }
    }

    /// Name of the module this error is about, if any
    pub fn module(&self) -> Option<&str> {
        match self {
            Self::Load { module, .. }
            | Self::Execution { module, .. }
            | Self::DependencyFailed { module, .. } => Some(module),
            Self::AmbiguousDefinition { fallback, .. } => Some(fallback),
            _ => None,
        }
    }

    /// The innermost error of a dependency failure chain
    pub fn root_cause(&self) -> &LoaderError {
        let mut current = self;
        while let Self::DependencyFailed { source, .. } = current {
            current = source;
        }
        current
    }

    /// Whether the root cause is a fetch failure
    pub fn is_load_error(&self) -> bool {
        matches!(self.root_cause(), Self::Load { .. })
    }
}

impl From<serde_json::Error> for LoaderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_walks_chain() {
        let load = LoaderError::Load {
            module: "b.js".to_string(),
            url: "./b.js".to_string(),
            source: TransportError::status("./b.js", 404, "Not Found"),
        };
        let chained = LoaderError::dependency_failed(
            "top.js",
            LoaderError::dependency_failed("a.js", load),
        );

        assert!(chained.is_load_error());
        assert_eq!(chained.root_cause().module(), Some("b.js"));
        let message = chained.to_string();
        assert!(message.contains("top.js"));
        assert!(message.contains("./b.js"));
    }

    #[test]
    fn test_transport_status() {
        let err = TransportError::status("./x.js", 404, "Not Found");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "request for ./x.js failed: 404 - Not Found");
    }
}
