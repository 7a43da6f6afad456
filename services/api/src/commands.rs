use crate::infra::InMemoryLoanSource;
use clap::Args;
use deal_validator::config::{AppConfig, ValidationConfig};
use deal_validator::error::AppError;
use deal_validator::telemetry;
use deal_validator::validation::{
    Finding, LoanType, LoanValidationService, RuleSet, SourceError, ValidationOutcome, Verdict,
};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const LOAN_TYPES: [LoanType; 6] = [
    LoanType::Senior,
    LoanType::Mezzanine,
    LoanType::Preferred,
    LoanType::ATranche,
    LoanType::BTranche,
    LoanType::Other,
];

#[derive(Args, Debug)]
#[command(group(
    clap::ArgGroup::new("target")
        .required(true)
        .args(["id", "name", "file"]),
))]
pub(crate) struct ValidateArgs {
    /// Loan id to fetch from the configured loan source
    #[arg(long)]
    pub(crate) id: Option<String>,
    /// Loan name to fetch (exact, case-insensitive)
    #[arg(long)]
    pub(crate) name: Option<String>,
    /// Match the name by substring instead of exactly
    #[arg(long, requires = "name")]
    pub(crate) contains: bool,
    /// Validate a JSON loan payload read from disk
    #[arg(long)]
    pub(crate) file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct BatchArgs {
    /// Loan ids to validate, in output order
    #[arg(required = true)]
    pub(crate) loan_ids: Vec<String>,
}

#[derive(Args, Debug)]
pub(crate) struct SearchArgs {
    /// Case-insensitive name prefix
    pub(crate) prefix: String,
}

#[derive(Args, Debug, Default)]
pub(crate) struct RulesCheckArgs {
    /// Rule store to check (defaults to VALIDATOR_RULES_PATH)
    #[arg(long)]
    pub(crate) path: Option<PathBuf>,
}

/// Loads configuration and starts logging on stderr, keeping stdout for reports.
fn command_config() -> Result<AppConfig, AppError> {
    let config = AppConfig::load()?;
    telemetry::init_stderr(&config.telemetry)?;
    Ok(config)
}

fn build_service(
    config: &ValidationConfig,
) -> Result<LoanValidationService<InMemoryLoanSource>, AppError> {
    let rules = Arc::new(RuleSet::from_path(&config.rules_path)?);
    let source = InMemoryLoanSource::load(config.loans_path.as_deref())?;
    Ok(LoanValidationService::new(Arc::new(source), rules))
}

fn read_payload(path: &Path) -> Result<Value, AppError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err).into())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    println!("{rendered}");
    Ok(())
}

pub(crate) fn run_validate(args: ValidateArgs) -> Result<(), AppError> {
    let config = command_config()?;
    let service = build_service(&config.validation)?;

    let verdict = if let Some(id) = args.id {
        service.validate_by_id(&id)?
    } else if let Some(name) = args.name {
        service.validate_by_name(&name, !args.contains)?
    } else if let Some(path) = args.file {
        service.validate_record(read_payload(&path)?)?
    } else {
        return Err(SourceError::MissingIdentifier("Loan ID").into());
    };

    print_json(&verdict)?;
    for line in summary_lines(&verdict) {
        println!("{line}");
    }
    Ok(())
}

pub(crate) fn run_batch(args: BatchArgs) -> Result<(), AppError> {
    let config = command_config()?;
    let service = build_service(&config.validation)?;

    let outcomes = service.validate_batch(&args.loan_ids);
    print_json(&outcomes)?;

    println!();
    for outcome in &outcomes {
        println!("{}", outcome_line(outcome));
    }
    Ok(())
}

pub(crate) fn run_search(args: SearchArgs) -> Result<(), AppError> {
    let config = command_config()?;
    let service = build_service(&config.validation)?;

    let loans = service.search(&args.prefix)?;
    println!("{} loan(s) matching '{}'", loans.len(), args.prefix);
    for loan in &loans {
        println!("  {}  {}", loan.id, loan.name);
    }
    Ok(())
}

pub(crate) fn run_rules_check(args: RulesCheckArgs) -> Result<(), AppError> {
    let config = command_config()?;
    let path = args.path.unwrap_or(config.validation.rules_path);

    let rules = RuleSet::from_path(&path)?;
    for line in rule_store_report(&path, &rules) {
        println!("{line}");
    }
    Ok(())
}

fn rule_store_report(path: &Path, rules: &RuleSet) -> Vec<String> {
    let tables: Vec<&str> = rules.catalog().tables().collect();
    let mut lines = vec![
        format!("Rule store {} is valid", path.display()),
        format!("  {} rule(s) over tables: {}", rules.len(), tables.join(", ")),
    ];
    lines.extend(LOAN_TYPES.iter().map(|loan_type| {
        format!(
            "  {:<18} {} rule(s)",
            loan_type.label(),
            rules.rules_for(*loan_type).len()
        )
    }));
    lines
}

fn finding_line(finding: &Finding) -> String {
    let location: Vec<&str> = [finding.table(), finding.row_id(), finding.field()]
        .into_iter()
        .flatten()
        .collect();
    if location.is_empty() {
        format!("  - {}", finding.message())
    } else {
        format!("  - [{}] {}", location.join(" / "), finding.message())
    }
}

fn summary_lines(verdict: &Verdict) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        format!("Loan: {} ({})", verdict.loan_name(), verdict.loan_id()),
        format!(
            "Validation {}: {} error(s), {} warning(s)",
            if verdict.passed() { "passed" } else { "failed" },
            verdict.errors().len(),
            verdict.warnings().len()
        ),
    ];
    if !verdict.errors().is_empty() {
        lines.push("Errors:".to_string());
        lines.extend(verdict.errors().iter().map(finding_line));
    }
    if !verdict.warnings().is_empty() {
        lines.push("Warnings:".to_string());
        lines.extend(verdict.warnings().iter().map(finding_line));
    }
    lines
}

fn outcome_line(outcome: &ValidationOutcome) -> String {
    match outcome {
        ValidationOutcome::Evaluated(verdict) => format!(
            "{}: {} ({} error(s), {} warning(s))",
            verdict.loan_id(),
            if verdict.passed() { "passed" } else { "failed" },
            verdict.errors().len(),
            verdict.warnings().len()
        ),
        ValidationOutcome::NotEvaluated(failure) => {
            format!("{}: not evaluated ({})", failure.loan_id(), failure.error())
        }
    }
}
