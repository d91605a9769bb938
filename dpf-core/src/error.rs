// MIT License
// Copyright 2023--present dpf-core developers

//! Crate-wide error type.
//!
//! Every failure carries enough context to attribute it: the operator kind,
//! and the pin name and index where one is involved. Nothing in this crate
//! retries; errors are surfaced to the caller as soon as they are detected.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Direction of a pin on an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinDirection {
    Input,
    Output,
}

impl fmt::Display for PinDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinDirection::Input => f.write_str("input"),
            PinDirection::Output => f.write_str("output"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// The server did not become ready within the connection timeout.
    #[error("unable to connect to DPF instance at {endpoint} within {timeout:?}: {reason}")]
    Connection {
        endpoint: String,
        timeout: Duration,
        reason: String,
    },

    /// A plugin path with a directory component does not exist locally.
    #[error("library \"{}\" not found", .0.display())]
    MissingPluginFile(PathBuf),

    /// The server refused or failed to load a plugin library.
    #[error("unable to load library \"{path}\"; check for missing dependencies or whether the file exists: {source}")]
    PluginLoad {
        path: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{operator}: {direction} pin {pin} ({name}) accepts [{expected}], got {actual}")]
    TypeMismatch {
        operator: String,
        direction: PinDirection,
        pin: u32,
        name: String,
        expected: String,
        actual: String,
    },

    #[error("{operator}: required input pin {pin} ({name}) is not connected")]
    MissingRequiredInput {
        operator: String,
        pin: u32,
        name: String,
    },

    #[error("evaluation cycle detected at operator {operator}")]
    EvaluationCycle { operator: String },

    #[error("{operator}: no {direction} pin with index {pin}")]
    UnknownPin {
        operator: String,
        direction: PinDirection,
        pin: u32,
    },

    #[error("{operator}: no {direction} pin named \"{name}\"")]
    UnknownPinName {
        operator: String,
        direction: PinDirection,
        name: String,
    },

    #[error("unknown operator kind \"{0}\"")]
    UnknownOperator(String),

    #[error("unknown semantic type tag \"{0}\"")]
    UnknownType(String),

    /// The server returned a value whose type is not declared on the pin.
    #[error("{operator}: output pin {pin} ({name}) declares [{expected}], server returned {actual}")]
    UnexpectedOutput {
        operator: String,
        pin: u32,
        name: String,
        expected: String,
        actual: String,
    },

    /// An upstream operator belongs to a different service.
    #[error("{operator}: cannot connect an output of {upstream}, it belongs to another service")]
    ForeignOperator { operator: String, upstream: String },

    #[error("duplicate {direction} pin index {pin} in specification")]
    DuplicatePin { direction: PinDirection, pin: u32 },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Transport or remote failure, message preserved as received.
    #[error("{0}")]
    Transport(String),
}

impl Error {
    pub(crate) fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }
}
