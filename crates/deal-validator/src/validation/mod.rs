//! Rule-driven validation of loan records.
//!
//! A [`RuleSet`] is loaded once from the rule store and shared as `Arc<RuleSet>`.
//! Each fetched [`LoanRecord`] is evaluated independently by the
//! [`EvaluationEngine`]; findings stream into a [`VerdictAssembler`] and come
//! back as a [`Verdict`]. [`ValidationSession`] runs single-record and batch
//! validation, and [`LoanValidationService`] puts a [`LoanSource`] in front of it.

pub mod evaluation;
pub mod record;
pub mod router;
pub mod rules;
pub mod service;
pub mod session;
pub mod source;
pub mod verdict;

pub use evaluation::EvaluationEngine;
pub use record::{
    FieldLookup, FieldValue, LoanHeader, LoanId, LoanRecord, LoanType, PaymentType, RecordError,
    Row,
};
pub use router::validation_router;
pub use rules::{FieldCatalog, Rule, RuleSet, RuleSetError, Severity};
pub use service::{LoanValidationService, ValidationServiceError};
pub use session::ValidationSession;
pub use source::{LoanSource, LoanSummary, SourceError};
pub use verdict::{
    FetchFailure, Finding, FindingSink, ValidationOutcome, Verdict, VerdictAssembler,
};

#[cfg(test)]
mod tests;
