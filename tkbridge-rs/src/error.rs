//! Error taxonomy for the bridge.
//!
//! Every fallible operation returns [`Result`].  Nothing in the bridge retries
//! a failed native call: after a failure the native state is considered
//! possibly inconsistent and the decision is left to the host.

use std::path::PathBuf;

use thiserror::Error;

/// Library-wide result alias.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Interpreter creation, initialisation, command deletion or any other
    /// primitive call on the native handle reported failure.
    #[error("{op} failed: {message}")]
    Interpreter { op: &'static str, message: String },

    /// A submitted script returned a non-OK status.
    #[error("error evaluating `{script}`: {message}")]
    Eval { script: String, message: String },

    /// Typed extraction from a native object failed.
    #[error("expected {kind} but got {source_repr:?}")]
    Conversion { kind: &'static str, source_repr: String },

    /// A composite value was handed to the codec.
    #[error("composite values are not directly convertible: {0}")]
    Composite(String),

    /// Misuse of the variable register/unregister discipline.
    #[error("variable `{name}`: {reason}")]
    Variable { name: String, reason: &'static str },

    /// The native side invoked the dispatcher with a token it cannot resolve.
    #[error("cannot dispatch `{token}`: {reason}")]
    Dispatch { token: String, reason: &'static str },

    /// A typed option record was asked to set a key it does not declare.
    #[error("unknown option `{key}` for {record}")]
    UnknownOption { record: &'static str, key: String },

    /// An optional toolkit feature is not available.
    #[error("{0}")]
    Toolkit(String),

    /// A shared library could not be opened or lacks a required symbol.
    #[error("cannot load {}: {source}", path.display())]
    Library {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("config {path}: {message}")]
    Config { path: String, message: String },
}

impl BridgeError {
    pub(crate) fn interp(op: &'static str, message: impl Into<String>) -> Self {
        BridgeError::Interpreter { op, message: message.into() }
    }

    pub(crate) fn variable(name: impl Into<String>, reason: &'static str) -> Self {
        BridgeError::Variable { name: name.into(), reason }
    }

    pub(crate) fn dispatch(token: impl Into<String>, reason: &'static str) -> Self {
        BridgeError::Dispatch { token: token.into(), reason }
    }

    /// `true` for both flavours of conversion failure.
    pub fn is_conversion(&self) -> bool {
        matches!(self, BridgeError::Conversion { .. } | BridgeError::Composite(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_error_mentions_script_and_message() {
        let e = BridgeError::Eval {
            script: "frobnicate .".into(),
            message: "invalid command name \"frobnicate\"".into(),
        };
        let s = e.to_string();
        assert!(s.contains("frobnicate ."));
        assert!(s.contains("invalid command name"));
    }

    #[test]
    fn conversion_family() {
        let a = BridgeError::Conversion { kind: "integer", source_repr: "abc".into() };
        assert_eq!(a.to_string(), "expected integer but got \"abc\"");
        assert!(a.is_conversion());
        assert!(BridgeError::Composite("{a b}".into()).is_conversion());
        assert!(!BridgeError::variable("v", "not registered").is_conversion());
    }

    #[test]
    fn variable_error_display() {
        let e = BridgeError::variable("counter", "not registered");
        assert_eq!(e.to_string(), "variable `counter`: not registered");
    }
}
