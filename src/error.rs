use thiserror::Error;

/// Errors raised while building, assembling or solving a circuit.
///
/// Build-time variants are reported per call and leave the circuit as it
/// was before the call. `SingularSystem` is raised once per solve.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CircuitError {
    /// A terminal refers to a node name that was never added
    #[error("Node '{node}' not found in circuit")]
    UnknownNode { node: String },

    /// A second terminal declaration could not be applied
    #[error("Element '{element}': {reason}")]
    TerminalConflict { element: String, reason: String },

    /// An element name was reused with a different kind
    #[error("Element '{element}' is a {existing}, not a {requested}")]
    KindMismatch {
        element: String,
        existing: &'static str,
        requested: &'static str,
    },

    /// No element with the given name exists
    #[error("Element '{element}' not found in circuit")]
    UnknownElement { element: String },

    /// An element name was reused through the single-call API
    #[error("Element '{element}' already exists")]
    DuplicateElement { element: String },

    /// Both terminals of an element sit on the same node
    #[error("Element '{element}' connects node '{node}' to itself")]
    SelfLoop { element: String, node: String },

    /// A nominal value the element kind cannot carry
    #[error("Element '{element}' has invalid value {value}: {reason}")]
    InvalidValue {
        element: String,
        value: f64,
        reason: &'static str,
    },

    /// Assembly was attempted before a reference node was chosen
    #[error("Ground node has not been resolved")]
    GroundNotResolved,

    /// The linear system has no finite, stable solution
    #[error("Singular system: {reason}")]
    SingularSystem { reason: String },
}

impl CircuitError {
    /// System with no unique solution
    pub(crate) fn singular(reason: impl Into<String>) -> Self {
        CircuitError::SingularSystem {
            reason: reason.into(),
        }
    }

    /// Declaration that cannot bind a terminal
    pub(crate) fn conflict(element: &str, reason: impl Into<String>) -> Self {
        CircuitError::TerminalConflict {
            element: element.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for the circuit core.
pub type CircuitResult<T> = std::result::Result<T, CircuitError>;
