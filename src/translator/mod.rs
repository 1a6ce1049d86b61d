// Copyright 2025 RelCalc Project Authors. Licensed under Apache-2.0.

//! Lowering of the three source notations into the algebra.
//!
//! To raise an error in a translator, construct an `ErrorKind` and attach
//! the offending node's code region if it has one:
//!
//! ```ignore
//! return Err(ErrorKind::UnknownRelation("r".into()).into());
//! return Err(ErrorKind::UnknownRelation("r".into()).with_region(region));
//! ```

use crate::algebra::{CodeRegion, Plan, PlanError};
use crate::executor::ExecuteError;
use crate::types::ConvertError;

pub mod algebra;
pub mod sql;
pub mod trc;

pub type Result<T = Plan> = std::result::Result<T, TranslateError>;

/// The error type of translation.
#[derive(thiserror::Error, Debug, PartialEq)]
pub struct TranslateError(#[from] Box<Inner>);

#[derive(thiserror::Error, Debug, PartialEq)]
struct Inner {
    #[source]
    kind: ErrorKind,
    region: Option<CodeRegion>,
}

impl std::fmt::Display for TranslateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(region) = &self.region {
            write!(f, " at {region}")?;
        }
        Ok(())
    }
}

/// What went wrong during a translation.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ErrorKind {
    #[error("unknown relation {0:?}")]
    UnknownRelation(String),
    #[error("unbound tuple variable {0:?}")]
    UnboundVariable(String),
    #[error("tuple variable {0:?} is bound to both {1:?} and {2:?}")]
    ConflictingVariable(String, String, String),
    #[error("no base relation in scope")]
    NullBase,
    #[error("a relation predicate cannot be negated")]
    NegatedRelationPredicate,
    #[error("not supported: {0}")]
    Unsupported(String),
    #[error("plan error: {0}")]
    Plan(#[from] PlanError),
    #[error("execute error: {0}")]
    Execute(#[from] ExecuteError),
    #[error("conversion error: {0}")]
    Convert(#[from] ConvertError),
}

impl ErrorKind {
    /// Create a `TranslateError` carrying a code region.
    pub fn with_region(self, region: CodeRegion) -> TranslateError {
        TranslateError(Box::new(Inner {
            kind: self,
            region: Some(region),
        }))
    }

    /// Create a `TranslateError` carrying a region if one is known.
    pub fn at(self, region: Option<&CodeRegion>) -> TranslateError {
        TranslateError(Box::new(Inner {
            kind: self,
            region: region.cloned(),
        }))
    }
}

impl From<ErrorKind> for TranslateError {
    fn from(kind: ErrorKind) -> Self {
        TranslateError(Box::new(Inner { kind, region: None }))
    }
}

impl TranslateError {
    pub fn kind(&self) -> &ErrorKind {
        &self.0.kind
    }

    pub fn region(&self) -> Option<&CodeRegion> {
        self.0.region.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_one_pointer() {
        assert_eq!(
            std::mem::size_of::<TranslateError>(),
            std::mem::size_of::<usize>(),
            "the size of TranslateError should be one pointer"
        );
    }

    #[test]
    fn display_includes_region() {
        let err = ErrorKind::UnknownRelation("q".into())
            .with_region(CodeRegion::new(3, 7, "Q(t)"));
        assert_eq!(err.to_string(), "unknown relation \"q\" at 3..7: \"Q(t)\"");
    }
}
