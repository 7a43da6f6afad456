use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use super::record::{LoanId, LoanRecord, RecordError};
use super::rules::RuleSet;
use super::session::ValidationSession;
use super::source::{LoanSource, LoanSummary, SourceError};
use super::verdict::{ValidationOutcome, Verdict};

/// Service composing a data source with the validation session.
pub struct LoanValidationService<S> {
    source: Arc<S>,
    session: ValidationSession,
}

impl<S> LoanValidationService<S>
where
    S: LoanSource + 'static,
{
    pub fn new(source: Arc<S>, rules: Arc<RuleSet>) -> Self {
        Self {
            source,
            session: ValidationSession::new(rules),
        }
    }

    pub fn session(&self) -> &ValidationSession {
        &self.session
    }

    /// Fetch a loan by identifier and validate it.
    pub fn validate_by_id(&self, loan_id: &str) -> Result<Verdict, ValidationServiceError> {
        let loan_id = loan_id.trim();
        if loan_id.is_empty() {
            return Err(SourceError::MissingIdentifier("Loan ID").into());
        }
        let record = self.source.fetch_by_id(&LoanId(loan_id.to_string()))?;
        Ok(self.finish(&record))
    }

    /// Fetch a loan by display name and validate it.
    pub fn validate_by_name(
        &self,
        loan_name: &str,
        exact_match: bool,
    ) -> Result<Verdict, ValidationServiceError> {
        let loan_name = loan_name.trim();
        if loan_name.is_empty() {
            return Err(SourceError::MissingIdentifier("Loan name").into());
        }
        let record = self.source.fetch_by_name(loan_name, exact_match)?;
        Ok(self.finish(&record))
    }

    /// Validate a caller-supplied payload without touching the data source.
    pub fn validate_record(&self, payload: Value) -> Result<Verdict, ValidationServiceError> {
        let record = LoanRecord::from_payload(payload)?;
        Ok(self.finish(&record))
    }

    /// One outcome per requested id, in order.
    pub fn validate_batch(&self, loan_ids: &[String]) -> Vec<ValidationOutcome> {
        let ids: Vec<LoanId> = loan_ids
            .iter()
            .map(|id| LoanId(id.trim().to_string()))
            .collect();
        let outcomes = self.session.validate_batch(self.source.as_ref(), &ids);

        let passed = outcomes.iter().filter(|outcome| outcome.passed()).count();
        info!(
            total = outcomes.len(),
            passed,
            failed = outcomes.len() - passed,
            "batch validation complete"
        );
        outcomes
    }

    pub fn search(&self, prefix: &str) -> Result<Vec<LoanSummary>, ValidationServiceError> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(SourceError::MissingIdentifier("Search prefix").into());
        }
        Ok(self.source.search(prefix)?)
    }

    fn finish(&self, record: &LoanRecord) -> Verdict {
        let verdict = self.session.validate(record);
        info!(
            loan_id = %verdict.loan_id(),
            loan_name = verdict.loan_name(),
            errors = verdict.errors().len(),
            warnings = verdict.warnings().len(),
            passed = verdict.passed(),
            "loan validated"
        );
        verdict
    }
}

/// Error raised by the validation service.
#[derive(Debug, thiserror::Error)]
pub enum ValidationServiceError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("invalid loan payload: {0}")]
    Record(#[from] RecordError),
}
