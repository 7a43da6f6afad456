use std::sync::Arc;

use axum::response::Response;
use serde_json::{json, Value};

use crate::validation::{
    LoanId, LoanRecord, LoanSource, LoanSummary, LoanValidationService, RuleSet, SourceError,
};

pub(super) const LOAN_ID: &str = "a0i-100";
pub(super) const LOAN_NAME: &str = "Canyon Valley - Mezz";

pub(super) fn catalog() -> Value {
    json!({
        "LOAN_INFO": {
            "ID": "Loan ID",
            "NAME": "Loan Name",
            "LOAN_TYPE": "Loan Type",
            "LLC_BI__AMOUNT__C": "Loan Amount",
            "LLC_BI__CLOSEDATE__C": "Close Date",
            "LLC_BI__FIRST_PAYMENT_DATE__C": "First Payment Date"
        },
        "DRAW": {
            "ID": "ID",
            "LLC_BI__AMOUNT__C": "Draw Amount",
            "LLC_BI__PAID_AT_CLOSING__C": "Paid At Closing",
            "CM_FEE_DATE__C": "Draw Date",
            "CM_END_DATE__C": "Draw End Date"
        },
        "PRICING": {
            "ID": "ID",
            "LLC_BI__EFFECTIVE_DATE__C_Y": "Rate Effective Date",
            "LLC_BI__INTEREST_RATE_TYPE__C": "Interest Rate Type"
        }
    })
}

pub(super) fn rule_set(rules: Value) -> Arc<RuleSet> {
    Arc::new(
        RuleSet::from_value(json!({ "tables": catalog(), "rules": rules }))
            .expect("rule set loads"),
    )
}

pub(super) fn draw_sum_rule(severity: &str, tolerance: Value) -> Value {
    json!({
        "name": "draw-sum-matches-loan-amount",
        "scope": { "kind": "aggregate", "table": "DRAW", "field": "LLC_BI__AMOUNT__C" },
        "check": {
            "kind": "numeric_match",
            "against": { "kind": "header_field", "field": "LLC_BI__AMOUNT__C" },
            "tolerance": tolerance
        },
        "severity": severity,
        "message": "Total draw amounts do not match the loan amount ({value} vs {against})"
    })
}

pub(super) fn draw_end_date_required() -> Value {
    json!({
        "name": "draw-end-date-required",
        "scope": { "kind": "row_field", "table": "DRAW", "field": "CM_END_DATE__C" },
        "check": { "kind": "required" },
        "severity": "error"
    })
}

pub(super) fn draw(id: &str, amount: f64, end_date: Option<&str>) -> Value {
    json!({
        "ID": id,
        "LLC_BI__AMOUNT__C": amount,
        "CM_FEE_DATE__C": "2024-03-15",
        "CM_END_DATE__C": end_date,
    })
}

pub(super) fn loan_payload(id: &str, name: &str, draws: Vec<Value>) -> Value {
    json!({
        "ID": id,
        "NAME": name,
        "LLC_BI__AMOUNT__C": 7_000_000.0,
        "LLC_BI__CLOSEDATE__C": "2024-03-15",
        "LLC_BI__FIRST_PAYMENT_DATE__C": "2024-05-01",
        "DRAW_DETAILS": draws,
    })
}

pub(super) fn loan(draws: Vec<Value>) -> LoanRecord {
    LoanRecord::from_payload(loan_payload(LOAN_ID, LOAN_NAME, draws)).expect("payload parses")
}

pub(super) fn clean_draws() -> Vec<Value> {
    vec![
        draw("d-1", 3_000_000.0, Some("2024-06-30")),
        draw("d-2", 4_000_000.0, Some("2024-09-30")),
    ]
}

/// Data source backed by a fixed list of records.
#[derive(Default)]
pub(super) struct MemorySource {
    loans: Vec<LoanRecord>,
}

impl MemorySource {
    pub(super) fn with(loans: Vec<LoanRecord>) -> Self {
        Self { loans }
    }
}

impl LoanSource for MemorySource {
    fn fetch_by_id(&self, id: &LoanId) -> Result<LoanRecord, SourceError> {
        self.loans
            .iter()
            .find(|loan| loan.id() == id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(id.to_string()))
    }

    fn fetch_by_name(&self, name: &str, exact_match: bool) -> Result<LoanRecord, SourceError> {
        let lowered = name.to_lowercase();
        let matches: Vec<&LoanRecord> = self
            .loans
            .iter()
            .filter(|loan| {
                let candidate = loan.header().name().to_lowercase();
                if exact_match {
                    candidate == lowered
                } else {
                    candidate.contains(&lowered)
                }
            })
            .collect();
        match matches.as_slice() {
            [] => Err(SourceError::NameNotFound(name.to_string())),
            [only] => Ok((*only).clone()),
            [first, ..] if !exact_match => Ok((*first).clone()),
            _ => Err(SourceError::Ambiguous(name.to_string())),
        }
    }

    fn search(&self, prefix: &str) -> Result<Vec<LoanSummary>, SourceError> {
        let lowered = prefix.to_lowercase();
        Ok(self
            .loans
            .iter()
            .filter(|loan| loan.header().name().to_lowercase().starts_with(&lowered))
            .map(|loan| LoanSummary {
                name: loan.header().name().to_string(),
                id: loan.id().clone(),
            })
            .collect())
    }
}

/// Data source whose backend is always down.
pub(super) struct UnavailableSource;

impl LoanSource for UnavailableSource {
    fn fetch_by_id(&self, _id: &LoanId) -> Result<LoanRecord, SourceError> {
        Err(SourceError::Unavailable("connection refused".to_string()))
    }

    fn fetch_by_name(&self, _name: &str, _exact: bool) -> Result<LoanRecord, SourceError> {
        Err(SourceError::Unavailable("connection refused".to_string()))
    }

    fn search(&self, _prefix: &str) -> Result<Vec<LoanSummary>, SourceError> {
        Err(SourceError::Unavailable("connection refused".to_string()))
    }
}

pub(super) fn standard_rules() -> Arc<RuleSet> {
    rule_set(json!([
        draw_sum_rule("warning", json!({ "mode": "absolute", "amount": 0.01 })),
        draw_end_date_required(),
    ]))
}

pub(super) fn build_service(loans: Vec<LoanRecord>) -> Arc<LoanValidationService<MemorySource>> {
    Arc::new(LoanValidationService::new(
        Arc::new(MemorySource::with(loans)),
        standard_rules(),
    ))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
