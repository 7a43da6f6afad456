use serde::Serialize;

use super::record::{LoanHeader, LoanId};
use super::rules::Severity;

/// One concrete rule failure, scoped to a table, row and field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    #[serde(rename = "TABLE")]
    table: Option<String>,
    #[serde(rename = "ID")]
    row_id: Option<String>,
    #[serde(rename = "FIELD")]
    field: Option<String>,
    #[serde(rename = "MESSAGE")]
    message: String,
    #[serde(skip)]
    severity: Severity,
    #[serde(skip)]
    rule: String,
}

impl Finding {
    pub fn new(
        rule: impl Into<String>,
        severity: Severity,
        table: Option<&str>,
        row_id: Option<&str>,
        field: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            table: table.map(str::to_string),
            row_id: row_id.map(str::to_string),
            field: field.map(str::to_string),
            message: message.into(),
            severity,
            rule: rule.into(),
        }
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn row_id(&self) -> Option<&str> {
        self.row_id.as_deref()
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Name of the rule that produced the finding.
    pub fn rule(&self) -> &str {
        &self.rule
    }
}

/// Receives findings in emission order.
pub trait FindingSink {
    fn accept(&mut self, finding: Finding);
}

impl FindingSink for Vec<Finding> {
    fn accept(&mut self, finding: Finding) {
        self.push(finding);
    }
}

/// Full validation result for one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    #[serde(rename = "LOAN_NAME")]
    loan_name: String,
    #[serde(rename = "LOAN_ID")]
    loan_id: LoanId,
    #[serde(rename = "LOAN_AMOUNT")]
    loan_amount: Option<f64>,
    #[serde(rename = "CLOSE_DATE")]
    close_date: Option<String>,
    #[serde(rename = "WARNINGS")]
    warnings: Vec<Finding>,
    #[serde(rename = "ERRORS")]
    errors: Vec<Finding>,
    validation_passed: bool,
}

impl Verdict {
    pub fn loan_name(&self) -> &str {
        &self.loan_name
    }

    pub fn loan_id(&self) -> &LoanId {
        &self.loan_id
    }

    pub fn loan_amount(&self) -> Option<f64> {
        self.loan_amount
    }

    pub fn close_date(&self) -> Option<&str> {
        self.close_date.as_deref()
    }

    pub fn warnings(&self) -> &[Finding] {
        &self.warnings
    }

    pub fn errors(&self) -> &[Finding] {
        &self.errors
    }

    /// True iff no error was found; warnings never fail a record.
    pub fn passed(&self) -> bool {
        self.validation_passed
    }
}

/// Partitions the finding stream by severity, preserving emission order.
#[derive(Debug, Clone)]
pub struct VerdictAssembler {
    loan_name: String,
    loan_id: LoanId,
    loan_amount: Option<f64>,
    close_date: Option<String>,
    warnings: Vec<Finding>,
    errors: Vec<Finding>,
}

impl VerdictAssembler {
    pub fn for_header(header: &LoanHeader) -> Self {
        Self {
            loan_name: header.name().to_string(),
            loan_id: header.id().clone(),
            loan_amount: header.amount(),
            close_date: header.close_date(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn finish(self) -> Verdict {
        let validation_passed = self.errors.is_empty();
        Verdict {
            loan_name: self.loan_name,
            loan_id: self.loan_id,
            loan_amount: self.loan_amount,
            close_date: self.close_date,
            warnings: self.warnings,
            errors: self.errors,
            validation_passed,
        }
    }
}

impl FindingSink for VerdictAssembler {
    fn accept(&mut self, finding: Finding) {
        match finding.severity {
            Severity::Warning => self.warnings.push(finding),
            Severity::Error => self.errors.push(finding),
        }
    }
}

/// Sentinel for a batch position whose record could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    #[serde(rename = "LOAN_ID")]
    loan_id: LoanId,
    error: String,
    validation_passed: bool,
}

impl FetchFailure {
    pub fn new(loan_id: LoanId, error: impl Into<String>) -> Self {
        Self {
            loan_id,
            error: error.into(),
            validation_passed: false,
        }
    }

    pub fn loan_id(&self) -> &LoanId {
        &self.loan_id
    }

    pub fn error(&self) -> &str {
        &self.error
    }
}

/// Per-position batch result: evaluated, or never reached the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ValidationOutcome {
    Evaluated(Verdict),
    NotEvaluated(FetchFailure),
}

impl ValidationOutcome {
    pub fn loan_id(&self) -> &LoanId {
        match self {
            ValidationOutcome::Evaluated(verdict) => verdict.loan_id(),
            ValidationOutcome::NotEvaluated(failure) => failure.loan_id(),
        }
    }

    pub fn passed(&self) -> bool {
        match self {
            ValidationOutcome::Evaluated(verdict) => verdict.passed(),
            ValidationOutcome::NotEvaluated(_) => false,
        }
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            ValidationOutcome::Evaluated(verdict) => Some(verdict),
            ValidationOutcome::NotEvaluated(_) => None,
        }
    }
}

impl From<Verdict> for ValidationOutcome {
    fn from(verdict: Verdict) -> Self {
        ValidationOutcome::Evaluated(verdict)
    }
}

impl From<FetchFailure> for ValidationOutcome {
    fn from(failure: FetchFailure) -> Self {
        ValidationOutcome::NotEvaluated(failure)
    }
}
