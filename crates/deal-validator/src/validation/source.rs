use serde::{Deserialize, Serialize};

use super::record::{LoanId, LoanRecord, RecordError};

/// Name/id pair returned by prefix search.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoanSummary {
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "ID")]
    pub id: LoanId,
}

/// Supplies fetched loan records so the engine never talks to a backend directly.
pub trait LoanSource: Send + Sync {
    fn fetch_by_id(&self, id: &LoanId) -> Result<LoanRecord, SourceError>;

    /// Exact matching fails with [`SourceError::Ambiguous`] when several loans
    /// share the name; otherwise the first case-insensitive contains-match wins.
    fn fetch_by_name(&self, name: &str, exact_match: bool) -> Result<LoanRecord, SourceError>;

    fn search(&self, prefix: &str) -> Result<Vec<LoanSummary>, SourceError>;
}

/// Error enumeration for data-source failures.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("{0} is required.")]
    MissingIdentifier(&'static str),
    #[error("Loan {0} not found.")]
    NotFound(String),
    #[error("No loan found with name '{0}'.")]
    NameNotFound(String),
    #[error("Multiple loans found with exact name '{0}'. Please use loan ID instead.")]
    Ambiguous(String),
    #[error("stored loan payload is invalid: {0}")]
    InvalidPayload(#[from] RecordError),
    #[error("data source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    /// Lookup failures the caller can fix by changing the request.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self,
            SourceError::MissingIdentifier(_)
                | SourceError::NotFound(_)
                | SourceError::NameNotFound(_)
                | SourceError::Ambiguous(_)
        )
    }
}
