use std::sync::Arc;

use tracing::{debug, warn};

use super::evaluation::EvaluationEngine;
use super::record::{LoanId, LoanRecord};
use super::rules::RuleSet;
use super::source::LoanSource;
use super::verdict::{FetchFailure, ValidationOutcome, Verdict};

/// Runs the evaluation engine over one or many already-fetched records.
///
/// The session holds no per-record state, so a single instance can be shared
/// across threads and handlers.
#[derive(Debug, Clone)]
pub struct ValidationSession {
    engine: EvaluationEngine,
}

impl ValidationSession {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self {
            engine: EvaluationEngine::new(rules),
        }
    }

    pub fn engine(&self) -> &EvaluationEngine {
        &self.engine
    }

    pub fn rules(&self) -> &RuleSet {
        self.engine.rules()
    }

    pub fn validate(&self, record: &LoanRecord) -> Verdict {
        let verdict = self.engine.verdict(record);
        debug!(
            loan_id = %verdict.loan_id(),
            errors = verdict.errors().len(),
            warnings = verdict.warnings().len(),
            "record evaluated"
        );
        verdict
    }

    /// One verdict per record, in input order.
    pub fn validate_many<'a, I>(&self, records: I) -> Vec<Verdict>
    where
        I: IntoIterator<Item = &'a LoanRecord>,
    {
        records
            .into_iter()
            .map(|record| self.validate(record))
            .collect()
    }

    /// Evaluates fetch results in order, substituting a sentinel for every
    /// position whose fetch failed.
    pub fn validate_fetched<I, E>(&self, fetched: I) -> Vec<ValidationOutcome>
    where
        I: IntoIterator<Item = (LoanId, Result<LoanRecord, E>)>,
        E: std::fmt::Display,
    {
        fetched
            .into_iter()
            .map(|(loan_id, result)| match result {
                Ok(record) => ValidationOutcome::Evaluated(self.validate(&record)),
                Err(err) => {
                    warn!(%loan_id, error = %err, "loan could not be fetched for validation");
                    ValidationOutcome::NotEvaluated(FetchFailure::new(loan_id, err.to_string()))
                }
            })
            .collect()
    }

    /// Fetches each id from `source` and validates it; a failed fetch never aborts the batch.
    pub fn validate_batch<S>(&self, source: &S, ids: &[LoanId]) -> Vec<ValidationOutcome>
    where
        S: LoanSource + ?Sized,
    {
        self.validate_fetched(
            ids.iter()
                .map(|id| (id.clone(), source.fetch_by_id(id))),
        )
    }
}
