//! Error types for each stage of the pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A metadata query that the provider could not answer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("type `{0}` not found")]
    NotFound(String),

    #[error("{what} index {index} out of range (count {count})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        count: usize,
    },

    #[error("member id {0:#x} not found")]
    UnknownMember(i32),

    #[error("malformed {what}: {reason}")]
    Malformed { what: String, reason: String },
}

/// The library file could not be turned into a provider.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid type library {}: {reason}", .path.display())]
    Invalid { path: PathBuf, reason: String },
}

/// A shape the model cannot represent, or a broken reference that later
/// stages would otherwise have to guess around.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("alias cycle: {}", .0.join(" -> "))]
    AliasCycle(Vec<String>),

    #[error("inheritance cycle through `{0}`")]
    InheritanceCycle(String),

    #[error("record `{0}` contains itself by value")]
    RecursiveLayout(String),

    #[error("unsupported type shape: {0}")]
    UnsupportedShape(String),

    #[error("more than one default {role} interface")]
    DuplicateDefault { role: &'static str },

    #[error("interface `{0}` has no super interface")]
    MissingSuper(String),

    #[error("coclass `{0}` has no default interface")]
    MissingDefaultInterface(String),
}

/// Building the type model failed. Always names the failing type index.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("library attributes unavailable")]
    Library(#[source] ProviderError),

    #[error("type #{index}: metadata query failed")]
    Provider {
        index: usize,
        #[source]
        source: ProviderError,
    },

    #[error("type #{index} `{name}`: {source}")]
    Invariant {
        index: usize,
        name: String,
        #[source]
        source: InvariantViolation,
    },
}

/// The cross-library reference map could not be built.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("`{name}` is defined by both `{first}` and `{second}`; pin it to one package")]
    Ambiguous {
        name: String,
        first: String,
        second: String,
    },

    #[error("`{name}` is pinned to `{package}`, which does not define it")]
    UnknownPin { name: String, package: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerateError {
    #[error("cannot generate `{type_name}`: {violation}")]
    Invariant {
        type_name: String,
        #[source]
        violation: InvariantViolation,
    },
}

impl GenerateError {
    pub(crate) fn invariant(type_name: impl Into<String>, violation: InvariantViolation) -> Self {
        GenerateError::Invariant {
            type_name: type_name.into(),
            violation,
        }
    }
}

/// One output file that could not be written or removed.
#[derive(Debug, Error)]
#[error("failed to write {}", .path.display())]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Failure inside the model builder, before the type index is attached.
#[derive(Debug)]
pub(crate) enum Failure {
    Provider(ProviderError),
    Invariant(InvariantViolation),
}

impl From<ProviderError> for Failure {
    fn from(err: ProviderError) -> Self {
        Failure::Provider(err)
    }
}

impl From<InvariantViolation> for Failure {
    fn from(err: InvariantViolation) -> Self {
        Failure::Invariant(err)
    }
}
