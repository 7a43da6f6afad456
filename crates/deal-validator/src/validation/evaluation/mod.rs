mod checks;
mod resolve;

use std::sync::Arc;

use tracing::debug;

use super::record::{FieldValue, LoanRecord, Row};
use super::rules::{Check, MessageContext, Operand, Quantifier, Rule, RuleScope, RuleSet};
use super::verdict::{Finding, FindingSink, Verdict, VerdictAssembler};
use resolve::{Resolved, Resolver, RowContext};

/// Stateless evaluator that runs a shared rule set against one record at a time.
#[derive(Debug, Clone)]
pub struct EvaluationEngine {
    rules: Arc<RuleSet>,
}

/// Where a finding points inside the record.
#[derive(Clone, Copy, Default)]
struct Site<'a> {
    table: Option<&'a str>,
    row_id: Option<&'a str>,
    field: Option<&'a str>,
}

impl EvaluationEngine {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Evaluates every applicable rule and assembles the verdict.
    pub fn verdict(&self, record: &LoanRecord) -> Verdict {
        let mut assembler = VerdictAssembler::for_header(record.header());
        self.evaluate_into(record, &mut assembler);
        assembler.finish()
    }

    /// Findings in emission order: rule declaration order, then row order.
    pub fn evaluate(&self, record: &LoanRecord) -> Vec<Finding> {
        let mut findings = Vec::new();
        self.evaluate_into(record, &mut findings);
        findings
    }

    pub fn evaluate_into<S: FindingSink>(&self, record: &LoanRecord, sink: &mut S) {
        let resolver = Resolver::new(record, self.rules.catalog());
        for rule in self.rules.rules_for(record.header().loan_type()) {
            if !rule.applies_to(record.header()) {
                debug!(rule = rule.name(), loan_id = %record.id(), "rule gated out");
                continue;
            }
            evaluate_rule(rule, &resolver, sink);
        }
    }
}

fn evaluate_rule<'r, S: FindingSink>(rule: &'r Rule, resolver: &Resolver<'r>, sink: &mut S) {
    let check = rule.check();
    match rule.scope() {
        RuleScope::HeaderField { field } => {
            let subject = resolver.header(field);
            let against = check.against().map(|operand| resolver.operand(operand, None));
            let site = Site {
                field: Some(field),
                ..Site::default()
            };
            test_and_emit(rule, site, &subject, against.as_ref(), sink);
        }
        RuleScope::RowField {
            table,
            field,
            only_when,
        } => {
            for row in resolver.rows(table, only_when.as_ref()) {
                let context = RowContext { table, row };
                let subject = resolver.row(context, field);
                let against = check
                    .against()
                    .map(|operand| resolver.operand(operand, Some(context)));
                let site = Site {
                    table: Some(table),
                    row_id: row.id(),
                    field: Some(field),
                };
                test_and_emit(rule, site, &subject, against.as_ref(), sink);
            }
        }
        RuleScope::Aggregate {
            table,
            field,
            reduction,
            only_when,
        } => {
            let site = Site {
                table: Some(table),
                ..Site::default()
            };
            match resolver.aggregate(table, field, *reduction, only_when.as_ref()) {
                Some(subject) => {
                    let against = check.against().map(|operand| resolver.operand(operand, None));
                    test_and_emit(rule, site, &subject, against.as_ref(), sink);
                }
                None if matches!(check, Check::Required) => {
                    let subject = Resolved {
                        value: FieldValue::Absent,
                        label: resolver.aggregate_label(table, field, *reduction),
                    };
                    emit(rule, site, &subject, None, sink);
                }
                None => {}
            }
        }
        RuleScope::CrossField {
            left,
            right,
            quantifier,
        } => evaluate_cross_field(rule, resolver, left, right, *quantifier, sink),
    }
}

fn evaluate_cross_field<'r, S: FindingSink>(
    rule: &Rule,
    resolver: &Resolver<'r>,
    left: &'r Operand,
    right: &'r Operand,
    quantifier: Quantifier,
    sink: &mut S,
) {
    let row_operand = [left, right].into_iter().find_map(|operand| match operand {
        Operand::RowField {
            table: Some(table),
            field,
        } => Some((table.as_str(), field.as_str())),
        _ => None,
    });

    let Some((table, field)) = row_operand else {
        let subject = resolver.operand(left, None);
        let against = resolver.operand(right, None);
        test_and_emit(rule, operand_site(left), &subject, Some(&against), sink);
        return;
    };

    let rows: Vec<&Row> = resolver.record().table(table).iter().collect();
    match quantifier {
        Quantifier::Each => {
            for row in rows {
                let context = RowContext { table, row };
                let subject = resolver.operand(left, Some(context));
                let against = resolver.operand(right, Some(context));
                let site = Site {
                    table: Some(table),
                    row_id: row.id(),
                    field: Some(field),
                };
                test_and_emit(rule, site, &subject, Some(&against), sink);
            }
        }
        Quantifier::Any => {
            if rows.is_empty() {
                return;
            }
            let resolved: Vec<(Resolved, Resolved)> = rows
                .iter()
                .map(|&row| {
                    let context = RowContext { table, row };
                    (
                        resolver.operand(left, Some(context)),
                        resolver.operand(right, Some(context)),
                    )
                })
                .collect();
            let satisfied = resolved.iter().any(|(subject, against)| {
                checks::passes(rule.check(), &subject.value, Some(&against.value))
            });
            if satisfied {
                return;
            }

            let (subject, against) = summarize(&resolved, left.is_row_field());
            let site = Site {
                table: Some(table),
                ..Site::default()
            };
            emit(rule, site, &subject, Some(&against), sink);
        }
    }
}

/// Collapses per-row resolutions into one subject/comparand pair, listing every
/// row value on the row-backed side.
fn summarize(resolved: &[(Resolved, Resolved)], row_on_left: bool) -> (Resolved, Resolved) {
    let (subjects, comparands): (Vec<Resolved>, Vec<Resolved>) = resolved.iter().cloned().unzip();
    let (row_side, fixed_side) = if row_on_left {
        (subjects, comparands)
    } else {
        (comparands, subjects)
    };

    let values: Vec<String> = row_side
        .iter()
        .map(|resolved| resolved.value.render())
        .collect();
    let listed = Resolved {
        value: FieldValue::Text(values.join(", ")),
        label: row_side
            .first()
            .map(|resolved| resolved.label.clone())
            .unwrap_or_default(),
    };
    let fixed = fixed_side.into_iter().next().unwrap_or(Resolved {
        value: FieldValue::Absent,
        label: String::new(),
    });

    if row_on_left {
        (listed, fixed)
    } else {
        (fixed, listed)
    }
}

fn operand_site(operand: &Operand) -> Site<'_> {
    match operand {
        Operand::HeaderField { field } => Site {
            field: Some(field),
            ..Site::default()
        },
        Operand::Aggregate { table, .. } => Site {
            table: Some(table),
            ..Site::default()
        },
        Operand::RowField { table, field } => Site {
            table: table.as_deref(),
            field: Some(field),
            ..Site::default()
        },
        Operand::Literal { .. } => Site::default(),
    }
}

fn test_and_emit<S: FindingSink>(
    rule: &Rule,
    site: Site<'_>,
    subject: &Resolved,
    against: Option<&Resolved>,
    sink: &mut S,
) {
    let passed = checks::passes(
        rule.check(),
        &subject.value,
        against.map(|resolved| &resolved.value),
    );
    if !passed {
        emit(rule, site, subject, against, sink);
    }
}

fn emit<S: FindingSink>(
    rule: &Rule,
    site: Site<'_>,
    subject: &Resolved,
    against: Option<&Resolved>,
    sink: &mut S,
) {
    let check = rule.check();
    let (op, tolerance, allowed) = match check {
        Check::NumericMatch { tolerance, .. } => {
            ("equal to".to_string(), tolerance.describe(), String::new())
        }
        Check::Relational { op, .. } => (op.phrase().to_string(), String::new(), String::new()),
        Check::DateOrder { op, .. } => {
            (op.date_phrase().to_string(), String::new(), String::new())
        }
        Check::OneOf { values, .. } => {
            let allowed: Vec<String> = values.iter().map(FieldValue::render).collect();
            (String::new(), String::new(), allowed.join(", "))
        }
        Check::DateFormat { format } => (String::new(), String::new(), format.clone()),
        Check::Required | Check::NumericFormat => (String::new(), String::new(), String::new()),
    };

    let context = MessageContext {
        rule: rule.name(),
        table: site.table,
        row_id: site.row_id,
        field: site.field,
        label: subject.label.clone(),
        value: subject.value.render(),
        against: against
            .map(|resolved| resolved.value.render())
            .unwrap_or_default(),
        against_label: against
            .map(|resolved| resolved.label.clone())
            .unwrap_or_default(),
        tolerance,
        op,
        allowed,
    };

    sink.accept(Finding::new(
        rule.name(),
        rule.severity(),
        site.table,
        site.row_id,
        site.field,
        rule.template().render(&context),
    ));
}
