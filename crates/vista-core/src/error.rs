use crate::types::PartitionId;
use std::fmt;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VistaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Routing error: {0}")]
    Routing(#[source] io::Error),

    #[error("Consume error on partition {partition}: {message}")]
    Consume {
        partition: PartitionId,
        message: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Task error: {0}")]
    Task(String),

    #[error("{0}")]
    Aggregate(Errors),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl VistaError {
    /// Build a consume error for a partition from any displayable cause.
    pub fn consume(partition: PartitionId, cause: impl fmt::Display) -> Self {
        Self::Consume {
            partition,
            message: cause.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VistaError>;

/// Collects every failure of a multi-step operation instead of stopping at the first.
///
/// Used wherever several partitions are torn down or joined together: each
/// step's outcome is collected, and [`Errors::into_result`] reports "no error"
/// only when every step succeeded.
#[derive(Debug, Default)]
pub struct Errors {
    errors: Vec<VistaError>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: VistaError) {
        self.errors.push(err);
    }

    /// Record the error of `result`, if any. Returns true when it was an error.
    pub fn collect(&mut self, result: Result<()>) -> bool {
        match result {
            Ok(()) => false,
            Err(e) => {
                self.errors.push(e);
                true
            }
        }
    }

    /// Move all errors of `other` into this collection, flattening nested aggregates.
    pub fn merge(&mut self, other: Errors) {
        for err in other.errors {
            match err {
                VistaError::Aggregate(inner) => self.merge(inner),
                err => self.errors.push(err),
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VistaError> {
        self.errors.iter()
    }

    /// `Ok(())` if nothing was collected, the error itself if exactly one was,
    /// an [`VistaError::Aggregate`] otherwise.
    pub fn into_result(mut self) -> Result<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(VistaError::Aggregate(self)),
        }
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) occurred", self.errors.len())?;
        for (i, err) in self.errors.iter().enumerate() {
            write!(f, "\n  {}: {}", i + 1, err)?;
        }
        Ok(())
    }
}

impl From<Errors> for VistaError {
    fn from(errors: Errors) -> Self {
        VistaError::Aggregate(errors)
    }
}

impl From<serde_json::Error> for VistaError {
    fn from(err: serde_json::Error) -> Self {
        VistaError::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_errors_is_ok() {
        let errs = Errors::new();
        assert!(errs.is_empty());
        assert!(errs.into_result().is_ok());
    }

    #[test]
    fn test_single_error_is_unwrapped() {
        let mut errs = Errors::new();
        assert!(!errs.collect(Ok(())));
        assert!(errs.collect(Err(VistaError::Storage("close failed".into()))));
        match errs.into_result() {
            Err(VistaError::Storage(msg)) => assert_eq!(msg, "close failed"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_multiple_errors_aggregate() {
        let mut errs = Errors::new();
        errs.push(VistaError::Storage("a".into()));
        errs.push(VistaError::Storage("b".into()));
        let err = errs.into_result().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("2 error(s)"));
        assert!(msg.contains("Storage error: a"));
        assert!(msg.contains("Storage error: b"));
    }

    #[test]
    fn test_merge_flattens() {
        let mut inner = Errors::new();
        inner.push(VistaError::Storage("a".into()));
        inner.push(VistaError::Storage("b".into()));

        let mut outer = Errors::new();
        outer.push(VistaError::Config("c".into()));
        let mut nested = Errors::new();
        nested.push(VistaError::Aggregate(inner));
        outer.merge(nested);

        assert_eq!(outer.len(), 3);
    }
}
