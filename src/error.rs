//! Error types for actor outputs.
//!
//! All errors are strongly typed using thiserror and grouped by how the
//! caller is expected to react: configuration mistakes are fatal, shape and
//! state errors propagate to the engine, storage errors wrap I/O failures.

use thiserror::Error;

use crate::selector::RunIndex;

/// Programmer or configuration mistakes, discoverable at setup time.
///
/// These are never recovered in place. The engine collaborator aborts the
/// run when it sees one (see [`OutputError::is_fatal`]).
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid selector '{token}'. Allowed values are 'merged', 'all_runs', 'all' or a run index")]
    InvalidSelector {
        token: String,
    },

    #[error("Invalid selector '{token}' in {operation}() of output '{output}' (actor '{actor}'). Allowed values are 'merged', 'all_runs', 'all' or a run index")]
    UnknownSelector {
        token: String,
        operation: &'static str,
        output: String,
        actor: String,
    },

    #[error("Selector '{selector}' is not allowed in {operation}() of output '{output}' (actor '{actor}')")]
    SelectorNotAllowed {
        selector: String,
        operation: &'static str,
        output: String,
        actor: String,
    },

    #[error("Unknown data container class '{name}'")]
    UnknownContainerClass {
        name: String,
    },

    #[error("The belongs_to attribute of actor output '{output}' cannot be empty")]
    MissingOwner {
        output: String,
    },

    #[error("Container of class {class} does not belong to any actor output")]
    OrphanContainer {
        class: String,
    },

    #[error("Container belongs to actor output '{owner}', which is not registered")]
    UnknownOwner {
        owner: String,
    },

    #[error("Actor output name cannot be empty (actor '{actor}')")]
    EmptyOutputName {
        actor: String,
    },

    #[error("Actor '{actor}' already has an output called '{output}'")]
    DuplicateOutput {
        actor: String,
        output: String,
    },

    #[error("Output '{output}' of actor '{actor}' is managed by the engine: {operation}() must not be called")]
    ContractViolation {
        output: String,
        actor: String,
        operation: &'static str,
    },

    #[error("Output '{output}' of actor '{actor}' has no output path while writing was requested")]
    MissingOutputPath {
        output: String,
        actor: String,
    },

    #[error("Invalid {field} for output '{output}': {reason}")]
    InvalidField {
        output: String,
        field: &'static str,
        reason: String,
    },
}

/// Errors raised by data items when operands are incompatible or unset.
#[derive(Debug, Error, PartialEq)]
pub enum DataItemError {
    #[error("Incompatible shape: expected arity {expected}, got {actual}")]
    IncompatibleShape {
        expected: usize,
        actual: usize,
    },

    #[error("Shape mismatch: image size {expected:?} vs {actual:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        actual: [usize; 3],
    },

    #[error("This data item does not contain any data yet. Use set_payload() before applying any operations")]
    EmptyPayload,

    #[error("Unknown item '{item}' for a {shape} data item")]
    UnknownItem {
        item: String,
        shape: String,
    },

    #[error("Cannot merge a '{actual}' container into a '{expected}' container")]
    KindMismatch {
        expected: String,
        actual: String,
    },

    #[error("Cannot merge mean values without samples")]
    NoSamples,

    #[error("Payload has {actual} values but size {size:?} needs {expected}")]
    PayloadLength {
        size: [usize; 3],
        expected: usize,
        actual: usize,
    },
}

/// Errors about the lifecycle state of an output.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Output '{output}' holds no data for run {run}")]
    RunNotFound {
        output: String,
        run: RunIndex,
    },

    #[error("Run {run} of output '{output}' was already finalized")]
    RunFinalized {
        output: String,
        run: RunIndex,
    },

    #[error("Output '{output}' holds no merged data")]
    NoMergedData {
        output: String,
    },

    #[error("Data of output '{output}' was released from memory by close()")]
    DataReleased {
        output: String,
    },
}

/// Top-level error type for actor outputs.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Data item error: {0}")]
    DataItem(#[from] DataItemError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Not implemented: {feature} (output '{output}', actor '{actor}')")]
    NotImplemented {
        feature: &'static str,
        output: String,
        actor: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl OutputError {
    /// Returns true if the engine must abort the whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::NotImplemented { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns true if this is a data item (shape or payload) error.
    #[must_use]
    pub const fn is_data_item(&self) -> bool {
        matches!(self, Self::DataItem(_))
    }

    /// Returns true if this is a lifecycle state error.
    #[must_use]
    pub const fn is_state(&self) -> bool {
        matches!(self, Self::State(_))
    }

    /// Returns true for the explicit "not implemented" signal.
    #[must_use]
    pub const fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented { .. })
    }
}

/// Result type alias for actor output operations.
pub type OutputResult<T> = Result<T, OutputError>;
