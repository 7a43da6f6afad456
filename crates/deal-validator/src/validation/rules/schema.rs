use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::validation::record::{format_amount, FieldLookup, FieldValue, LoanType, DATE_FORMAT};

/// Finding severity. Only errors affect the pass/fail flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub const fn label(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// One declarative rule as written in the rule store.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub loan_types: Vec<LoanType>,
    #[serde(default)]
    pub when: Option<Condition>,
    pub scope: RuleScope,
    pub check: Check,
    pub severity: Severity,
    #[serde(default)]
    pub message: Option<String>,
}

/// Where a rule looks for the value it checks.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, tag = "kind", rename_all = "snake_case")]
pub enum RuleScope {
    HeaderField {
        field: String,
    },
    /// Evaluated independently against every row of `table`.
    RowField {
        table: String,
        field: String,
        #[serde(default)]
        only_when: Option<Condition>,
    },
    Aggregate {
        table: String,
        field: String,
        #[serde(default)]
        reduction: Reduction,
        #[serde(default)]
        only_when: Option<Condition>,
    },
    /// Compares `left` with `right`; the check supplies the operator.
    CrossField {
        left: Operand,
        right: Operand,
        #[serde(default)]
        quantifier: Quantifier,
    },
}

impl RuleScope {
    pub const fn keyword(&self) -> &'static str {
        match self {
            RuleScope::HeaderField { .. } => "header_field",
            RuleScope::RowField { .. } => "row_field",
            RuleScope::Aggregate { .. } => "aggregate",
            RuleScope::CrossField { .. } => "cross_field",
        }
    }
}

/// A value reference used as a comparand or as a cross-field side.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, tag = "kind", rename_all = "snake_case")]
pub enum Operand {
    Literal {
        value: FieldValue,
    },
    HeaderField {
        field: String,
    },
    /// Inside a row scope `table` may be omitted and refers to the current row.
    RowField {
        #[serde(default)]
        table: Option<String>,
        field: String,
    },
    Aggregate {
        table: String,
        field: String,
        #[serde(default)]
        reduction: Reduction,
        #[serde(default)]
        only_when: Option<Condition>,
    },
}

impl Operand {
    pub(crate) fn is_row_field(&self) -> bool {
        matches!(self, Operand::RowField { .. })
    }
}

/// How an aggregate collapses a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    #[default]
    Sum,
    Count,
    Min,
    Max,
}

impl Reduction {
    pub const fn label(self) -> &'static str {
        match self {
            Reduction::Sum => "Total",
            Reduction::Count => "Number of",
            Reduction::Min => "Minimum",
            Reduction::Max => "Maximum",
        }
    }
}

/// Whether a row-backed cross-field comparison fans out per row or needs one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantifier {
    #[default]
    Each,
    Any,
}

/// The test applied to a resolved value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, tag = "kind", rename_all = "snake_case")]
pub enum Check {
    Required,
    NumericFormat,
    DateFormat {
        #[serde(default = "default_date_format")]
        format: String,
    },
    NumericMatch {
        #[serde(default)]
        against: Option<Operand>,
        #[serde(default)]
        tolerance: Tolerance,
        #[serde(default)]
        allow_absent: bool,
    },
    Relational {
        op: RelationalOp,
        #[serde(default)]
        against: Option<Operand>,
        #[serde(default)]
        allow_absent: bool,
    },
    OneOf {
        values: Vec<FieldValue>,
        #[serde(default)]
        allow_absent: bool,
    },
    DateOrder {
        op: RelationalOp,
        #[serde(default)]
        against: Option<Operand>,
        #[serde(default)]
        allow_absent: bool,
    },
}

fn default_date_format() -> String {
    DATE_FORMAT.to_string()
}

impl Check {
    pub const fn keyword(&self) -> &'static str {
        match self {
            Check::Required => "required",
            Check::NumericFormat => "numeric_format",
            Check::DateFormat { .. } => "date_format",
            Check::NumericMatch { .. } => "numeric_match",
            Check::Relational { .. } => "relational",
            Check::OneOf { .. } => "one_of",
            Check::DateOrder { .. } => "date_order",
        }
    }

    /// Checks that compare the subject with a second value.
    pub const fn is_comparison(&self) -> bool {
        matches!(
            self,
            Check::NumericMatch { .. } | Check::Relational { .. } | Check::DateOrder { .. }
        )
    }

    pub fn against(&self) -> Option<&Operand> {
        match self {
            Check::NumericMatch { against, .. }
            | Check::Relational { against, .. }
            | Check::DateOrder { against, .. } => against.as_ref(),
            _ => None,
        }
    }

    pub(crate) const fn default_message(&self) -> &'static str {
        match self {
            Check::Required => "\"{label}\" is required.",
            Check::NumericFormat => "\"{label}\" must be a valid numeric value.",
            Check::DateFormat { .. } => "\"{label}\" has a problem: {value} is not a valid date.",
            Check::NumericMatch { .. } => {
                "{label} ({value}) does not match {against_label} ({against})."
            }
            Check::Relational { .. } => "{label} ({value}) must be {op} {against_label} ({against}).",
            Check::OneOf { .. } => "\"{label}\" must be one of: {allowed}.",
            Check::DateOrder { .. } => {
                "{label} ({value}) is supposed to be {op} {against_label} ({against}). But it is not"
            }
        }
    }
}

/// Accepted distance between two amounts. The boundary itself passes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields, tag = "mode", rename_all = "snake_case")]
pub enum Tolerance {
    #[default]
    Exact,
    /// Same units as the compared amounts.
    Absolute { amount: f64 },
    /// Fraction of the comparand, e.g. `0.01` for one percent.
    Relative { ratio: f64 },
}

fn to_cents(amount: f64) -> f64 {
    (amount * 100.0).round()
}

impl Tolerance {
    /// `Exact` compares whole cents so that summed amounts are not
    /// tripped up by binary rounding.
    pub fn allows(self, value: f64, target: f64) -> bool {
        let difference = (value - target).abs();
        match self {
            Tolerance::Exact => to_cents(value) == to_cents(target),
            Tolerance::Absolute { amount } => difference <= amount,
            Tolerance::Relative { ratio } => difference <= ratio * target.abs(),
        }
    }

    pub(crate) fn is_valid(self) -> bool {
        match self {
            Tolerance::Exact => true,
            Tolerance::Absolute { amount } => amount.is_finite() && amount >= 0.0,
            Tolerance::Relative { ratio } => ratio.is_finite() && ratio >= 0.0,
        }
    }

    pub(crate) fn describe(self) -> String {
        match self {
            Tolerance::Exact => format_amount(0.0),
            Tolerance::Absolute { amount } => format_amount(amount),
            Tolerance::Relative { ratio } => format!("{}%", ratio * 100.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RelationalOp {
    #[serde(rename = "=", alias = "==", alias = "eq")]
    Eq,
    #[serde(rename = "!=", alias = "≠", alias = "ne")]
    Ne,
    #[serde(rename = "<", alias = "lt")]
    Lt,
    #[serde(rename = "<=", alias = "≤", alias = "le")]
    Le,
    #[serde(rename = ">", alias = "gt")]
    Gt,
    #[serde(rename = ">=", alias = "≥", alias = "ge")]
    Ge,
}

impl RelationalOp {
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            RelationalOp::Eq => ordering == Ordering::Equal,
            RelationalOp::Ne => ordering != Ordering::Equal,
            RelationalOp::Lt => ordering == Ordering::Less,
            RelationalOp::Le => ordering != Ordering::Greater,
            RelationalOp::Gt => ordering == Ordering::Greater,
            RelationalOp::Ge => ordering != Ordering::Less,
        }
    }

    pub(crate) const fn phrase(self) -> &'static str {
        match self {
            RelationalOp::Eq => "equal to",
            RelationalOp::Ne => "different from",
            RelationalOp::Lt => "less than",
            RelationalOp::Le => "at most",
            RelationalOp::Gt => "greater than",
            RelationalOp::Ge => "at least",
        }
    }

    pub(crate) const fn date_phrase(self) -> &'static str {
        match self {
            RelationalOp::Eq => "same as",
            RelationalOp::Ne => "different from",
            RelationalOp::Lt => "before",
            RelationalOp::Le => "before or same as",
            RelationalOp::Gt => "after",
            RelationalOp::Ge => "after or same as",
        }
    }
}

/// Predicate over the fields of a header or a row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Equals { field: String, value: FieldValue },
    /// False when the field is absent.
    NotEquals { field: String, value: FieldValue },
    Contains { field: String, text: String },
    StartsWith { field: String, prefix: String },
    Present { field: String },
    Absent { field: String },
    All { conditions: Vec<Condition> },
    Any { conditions: Vec<Condition> },
    Not { condition: Box<Condition> },
}

impl Condition {
    pub fn holds<L: FieldLookup + ?Sized>(&self, source: &L) -> bool {
        match self {
            Condition::Equals { field, value } => source.field(field).loosely_equals(value),
            Condition::NotEquals { field, value } => {
                let current = source.field(field);
                !current.is_blank() && !current.loosely_equals(value)
            }
            Condition::Contains { field, text } => lowered(source.field(field))
                .map(|current| current.contains(&text.to_lowercase()))
                .unwrap_or(false),
            Condition::StartsWith { field, prefix } => lowered(source.field(field))
                .map(|current| current.starts_with(&prefix.to_lowercase()))
                .unwrap_or(false),
            Condition::Present { field } => !source.field(field).is_blank(),
            Condition::Absent { field } => source.field(field).is_blank(),
            Condition::All { conditions } => conditions.iter().all(|c| c.holds(source)),
            Condition::Any { conditions } => conditions.iter().any(|c| c.holds(source)),
            Condition::Not { condition } => !condition.holds(source),
        }
    }

    /// Every field name the condition reads, in declaration order.
    pub(crate) fn fields(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_fields(&mut names);
        names
    }

    fn collect_fields<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Condition::Equals { field, .. }
            | Condition::NotEquals { field, .. }
            | Condition::Contains { field, .. }
            | Condition::StartsWith { field, .. }
            | Condition::Present { field }
            | Condition::Absent { field } => names.push(field),
            Condition::All { conditions } | Condition::Any { conditions } => {
                for condition in conditions {
                    condition.collect_fields(names);
                }
            }
            Condition::Not { condition } => condition.collect_fields(names),
        }
    }
}

fn lowered(value: &FieldValue) -> Option<String> {
    if value.is_blank() {
        None
    } else {
        Some(value.render().to_lowercase())
    }
}
