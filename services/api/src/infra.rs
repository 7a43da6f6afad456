use deal_validator::error::AppError;
use deal_validator::validation::{
    FieldLookup, LoanId, LoanRecord, LoanSource, LoanSummary, SourceError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

const EXCLUDED_STATUSES: [&str; 3] = ["declined", "withdrawn", "superseded"];
const EXCLUDED_STAGE: &str = "complete";
const EXCLUDED_PRODUCT: &str = "main";

const STATUS_FIELD: &str = "LLC_BI__STATUS__C";
const STAGE_FIELD: &str = "LLC_BI__STAGE__C";
const PRODUCT_FIELD: &str = "LLC_BI__PRODUCT__C";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Loan source serving records parsed from a JSON fixture file.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryLoanSource {
    loans: Vec<LoanRecord>,
}

impl InMemoryLoanSource {
    pub(crate) fn from_records(loans: Vec<LoanRecord>) -> Self {
        Self { loans }
    }

    /// Reads an array of loan payloads. Every payload must parse.
    pub(crate) fn from_path(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        let payloads: Vec<Value> = serde_json::from_str(&raw)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        let loans = payloads
            .into_iter()
            .map(LoanRecord::from_payload)
            .collect::<Result<Vec<_>, _>>()?;

        info!(path = %path.display(), loans = loans.len(), "loan fixtures loaded");
        Ok(Self::from_records(loans))
    }

    /// Empty source when no fixture path is configured.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self, AppError> {
        match path {
            Some(path) => Self::from_path(path),
            None => Ok(Self::default()),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.loans.len()
    }
}

fn searchable(loan: &LoanRecord) -> bool {
    let header = loan.header();
    let lowered = |field: &str| {
        header
            .field(field)
            .as_text()
            .map(|value| value.trim().to_lowercase())
            .unwrap_or_default()
    };

    !EXCLUDED_STATUSES.contains(&lowered(STATUS_FIELD).as_str())
        && lowered(STAGE_FIELD) != EXCLUDED_STAGE
        && lowered(PRODUCT_FIELD) != EXCLUDED_PRODUCT
}

impl LoanSource for InMemoryLoanSource {
    fn fetch_by_id(&self, id: &LoanId) -> Result<LoanRecord, SourceError> {
        if id.0.trim().is_empty() {
            return Err(SourceError::MissingIdentifier("Loan ID"));
        }
        self.loans
            .iter()
            .find(|loan| loan.id() == id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(id.to_string()))
    }

    fn fetch_by_name(&self, name: &str, exact_match: bool) -> Result<LoanRecord, SourceError> {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return Err(SourceError::MissingIdentifier("Loan name"));
        }

        let mut matches = self.loans.iter().filter(|loan| {
            let candidate = loan.header().name().to_lowercase();
            if exact_match {
                candidate == wanted
            } else {
                candidate.contains(&wanted)
            }
        });

        let first = matches
            .next()
            .ok_or_else(|| SourceError::NameNotFound(name.to_string()))?;
        if exact_match && matches.next().is_some() {
            return Err(SourceError::Ambiguous(name.to_string()));
        }
        Ok(first.clone())
    }

    fn search(&self, prefix: &str) -> Result<Vec<LoanSummary>, SourceError> {
        let wanted = prefix.trim().to_lowercase();
        if wanted.is_empty() {
            return Err(SourceError::MissingIdentifier("Search prefix"));
        }

        let mut found: Vec<LoanSummary> = self
            .loans
            .iter()
            .filter(|loan| loan.header().name().to_lowercase().starts_with(&wanted))
            .filter(|loan| searchable(loan))
            .map(|loan| LoanSummary {
                name: loan.header().name().to_string(),
                id: loan.id().clone(),
            })
            .collect();
        found.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(found)
    }
}
