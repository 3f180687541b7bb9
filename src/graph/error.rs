//! Graph store error types
//!
//! The emitter treats the two classes differently: a statement-level
//! (`Constraint`) failure is recorded and the batch continues, while a
//! `Connectivity` failure aborts the emission phase.

use thiserror::Error;

/// Errors raised by a [`GraphStore`](super::GraphStore)
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store unreachable, authentication refused or session lost
    #[error("Graph store connectivity error: {0}")]
    Connectivity(String),

    /// The store rejected one statement
    #[error("Statement rejected: {message}")]
    Constraint { statement: String, message: String },

    /// Writing the statement log failed
    #[error("Statement log I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn constraint(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Constraint {
            statement: statement.into(),
            message: message.into(),
        }
    }

    /// Whether emission must stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::Io(_))
    }
}

impl From<neo4rs::Error> for StoreError {
    fn from(err: neo4rs::Error) -> Self {
        match err {
            neo4rs::Error::IOError { .. }
            | neo4rs::Error::ConnectionError
            | neo4rs::Error::AuthenticationError(_)
            | neo4rs::Error::UnsupportedScheme(_) => Self::Connectivity(err.to_string()),
            other => Self::constraint(String::new(), other.to_string()),
        }
    }
}
