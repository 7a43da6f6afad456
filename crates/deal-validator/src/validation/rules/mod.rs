mod schema;
mod template;

pub use schema::{
    Check, Condition, Operand, Quantifier, Reduction, RelationalOp, RuleDefinition, RuleScope,
    Severity, Tolerance,
};
pub use template::MessageTemplate;
pub(crate) use template::MessageContext;

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use super::record::{LoanHeader, LoanType, HEADER_TABLE};

/// Display names for every table and field rules are allowed to reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldCatalog {
    tables: BTreeMap<String, BTreeMap<String, String>>,
}

impl FieldCatalog {
    pub fn new(tables: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        Self { tables }
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn has_field(&self, table: &str, field: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|fields| fields.contains_key(field))
    }

    /// Display name for `table.field`, falling back to the raw field name.
    pub fn display_name<'a>(&'a self, table: &str, field: &'a str) -> &'a str {
        self.tables
            .get(table)
            .and_then(|fields| fields.get(field))
            .map(String::as_str)
            .unwrap_or(field)
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    fn require(&self, rule: &str, table: &str, field: &str) -> Result<(), RuleSetError> {
        if !self.has_table(table) {
            return Err(RuleSetError::UnknownTable {
                rule: rule.to_string(),
                table: table.to_string(),
            });
        }
        if !self.has_field(table, field) {
            return Err(RuleSetError::UnknownField {
                rule: rule.to_string(),
                table: table.to_string(),
                field: field.to_string(),
            });
        }
        Ok(())
    }

    fn require_condition(
        &self,
        rule: &str,
        table: &str,
        condition: Option<&Condition>,
    ) -> Result<(), RuleSetError> {
        for field in condition.map(Condition::fields).unwrap_or_default() {
            self.require(rule, table, field)?;
        }
        Ok(())
    }
}

/// A validated rule with its parsed message template.
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    definition: RuleDefinition,
    template: MessageTemplate,
}

impl Rule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn severity(&self) -> Severity {
        self.definition.severity
    }

    pub fn scope(&self) -> &RuleScope {
        &self.definition.scope
    }

    pub fn check(&self) -> &Check {
        &self.definition.check
    }

    pub fn template(&self) -> &MessageTemplate {
        &self.template
    }

    pub fn applies_to_type(&self, loan_type: LoanType) -> bool {
        self.definition.loan_types.is_empty() || self.definition.loan_types.contains(&loan_type)
    }

    /// Static loan-type gate plus the optional `when` condition.
    pub fn applies_to(&self, header: &LoanHeader) -> bool {
        self.applies_to_type(header.loan_type())
            && self
                .definition
                .when
                .as_ref()
                .map_or(true, |condition| condition.holds(header))
    }
}

/// Immutable, load-once collection of rules in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    catalog: FieldCatalog,
    rules: Vec<Rule>,
}

#[derive(Deserialize)]
struct RuleDocument {
    #[serde(default)]
    tables: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(alias = "validation_rules")]
    rules: Vec<Value>,
}

impl RuleSet {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RuleSetError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| RuleSetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn load<R: Read>(mut reader: R) -> Result<Self, RuleSetError> {
        let mut raw = String::new();
        reader
            .read_to_string(&mut raw)
            .map_err(|source| RuleSetError::Io {
                path: PathBuf::from("<reader>"),
                source,
            })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, RuleSetError> {
        let document: Value = serde_json::from_str(raw)?;
        Self::from_value(document)
    }

    pub fn from_value(document: Value) -> Result<Self, RuleSetError> {
        let document: RuleDocument = serde_json::from_value(document)?;
        let catalog = FieldCatalog::new(document.tables);

        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(document.rules.len());
        for (index, raw) in document.rules.into_iter().enumerate() {
            let fallback = format!("rule-{}", index + 1);
            let name = raw
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(fallback);

            let definition: RuleDefinition =
                serde_json::from_value(raw).map_err(|err| malformed(&name, err.to_string()))?;

            if !seen.insert(name.clone()) {
                return Err(RuleSetError::DuplicateRule(name));
            }
            if !definition.enabled {
                continue;
            }

            validate_definition(&name, &definition, &catalog)?;
            let source = definition
                .message
                .as_deref()
                .unwrap_or_else(|| definition.check.default_message());
            let template =
                MessageTemplate::parse(source).map_err(|reason| RuleSetError::InvalidTemplate {
                    rule: name.clone(),
                    reason,
                })?;

            rules.push(Rule {
                name,
                definition,
                template,
            });
        }

        Ok(Self { catalog, rules })
    }

    /// Rules statically applicable to `loan_type`, in declaration order.
    pub fn rules_for(&self, loan_type: LoanType) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|rule| rule.applies_to_type(loan_type))
            .collect()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Where an operand is being resolved from.
#[derive(Clone, Copy)]
enum OperandSite<'a> {
    Header,
    Row(&'a str),
    Cross,
}

fn validate_definition(
    name: &str,
    definition: &RuleDefinition,
    catalog: &FieldCatalog,
) -> Result<(), RuleSetError> {
    catalog.require_condition(name, HEADER_TABLE, definition.when.as_ref())?;

    let check = &definition.check;
    validate_check(name, check)?;

    match &definition.scope {
        RuleScope::HeaderField { field } => {
            catalog.require(name, HEADER_TABLE, field)?;
            validate_against(name, check, OperandSite::Header, catalog)
        }
        RuleScope::RowField {
            table,
            field,
            only_when,
        } => {
            catalog.require(name, table, field)?;
            catalog.require_condition(name, table, only_when.as_ref())?;
            validate_against(name, check, OperandSite::Row(table), catalog)
        }
        RuleScope::Aggregate {
            table,
            field,
            only_when,
            ..
        } => {
            catalog.require(name, table, field)?;
            catalog.require_condition(name, table, only_when.as_ref())?;
            validate_against(name, check, OperandSite::Header, catalog)
        }
        RuleScope::CrossField {
            left,
            right,
            quantifier,
        } => {
            if !check.is_comparison() {
                return Err(malformed(
                    name,
                    format!("cross_field rules need a comparison check, not `{}`", check.keyword()),
                ));
            }
            if check.against().is_some() {
                return Err(malformed(
                    name,
                    "cross_field rules compare `left` with `right`; remove `check.against`",
                ));
            }
            if matches!(left, Operand::Literal { .. }) {
                return Err(malformed(name, "a literal may only appear as the right operand"));
            }
            validate_operand(name, left, OperandSite::Cross, catalog)?;
            validate_operand(name, right, OperandSite::Cross, catalog)?;

            let row_operands = [left, right]
                .into_iter()
                .filter(|operand| operand.is_row_field())
                .count();
            if row_operands > 1 {
                return Err(malformed(name, "at most one operand may be a row_field"));
            }
            if *quantifier == Quantifier::Any && row_operands == 0 {
                return Err(malformed(name, "quantifier `any` needs a row_field operand"));
            }
            Ok(())
        }
    }
}

fn validate_check(name: &str, check: &Check) -> Result<(), RuleSetError> {
    match check {
        Check::NumericMatch { tolerance, .. } if !tolerance.is_valid() => {
            Err(malformed(name, "tolerance must be a non-negative number"))
        }
        Check::OneOf { values, .. } if values.is_empty() => {
            Err(malformed(name, "one_of needs at least one allowed value"))
        }
        Check::DateFormat { format } if format.trim().is_empty() => {
            Err(malformed(name, "date_format needs a non-empty format"))
        }
        _ => Ok(()),
    }
}

fn validate_against(
    name: &str,
    check: &Check,
    site: OperandSite<'_>,
    catalog: &FieldCatalog,
) -> Result<(), RuleSetError> {
    if !check.is_comparison() {
        return Ok(());
    }
    let against = check.against().ok_or_else(|| {
        malformed(
            name,
            format!("`{}` needs an `against` operand", check.keyword()),
        )
    })?;
    validate_operand(name, against, site, catalog)
}

fn validate_operand(
    name: &str,
    operand: &Operand,
    site: OperandSite<'_>,
    catalog: &FieldCatalog,
) -> Result<(), RuleSetError> {
    match operand {
        Operand::Literal { .. } => Ok(()),
        Operand::HeaderField { field } => catalog.require(name, HEADER_TABLE, field),
        Operand::RowField { table, field } => match (site, table.as_deref()) {
            (OperandSite::Header, _) => Err(malformed(
                name,
                "a row_field operand is only valid in row_field and cross_field scopes",
            )),
            (OperandSite::Row(own), None) => catalog.require(name, own, field),
            (OperandSite::Row(own), Some(table)) if table == own => {
                catalog.require(name, own, field)
            }
            (OperandSite::Row(own), Some(table)) => Err(malformed(
                name,
                format!("row_field operand must read the rule's own table {own}, not {table}"),
            )),
            (OperandSite::Cross, Some(table)) => catalog.require(name, table, field),
            (OperandSite::Cross, None) => Err(malformed(
                name,
                "a cross_field row_field operand must name its table",
            )),
        },
        Operand::Aggregate {
            table,
            field,
            only_when,
            ..
        } => {
            catalog.require(name, table, field)?;
            catalog.require_condition(name, table, only_when.as_ref())
        }
    }
}

fn malformed(rule: &str, reason: impl Into<String>) -> RuleSetError {
    RuleSetError::MalformedRuleDefinition {
        rule: rule.to_string(),
        reason: reason.into(),
    }
}

/// Configuration errors raised while loading a rule store.
#[derive(Debug, thiserror::Error)]
pub enum RuleSetError {
    #[error("failed to read rule store {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("rule store is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("malformed rule definition `{rule}`: {reason}")]
    MalformedRuleDefinition { rule: String, reason: String },
    #[error("rule `{rule}` references unknown table {table}")]
    UnknownTable { rule: String, table: String },
    #[error("rule `{rule}` references unknown field {table}.{field}")]
    UnknownField {
        rule: String,
        table: String,
        field: String,
    },
    #[error("rule `{rule}` has an invalid message template: {reason}")]
    InvalidTemplate { rule: String, reason: String },
    #[error("rule name `{0}` is declared more than once")]
    DuplicateRule(String),
}

impl RuleSetError {
    /// Name of the offending rule, when the error is about a single rule.
    pub fn rule(&self) -> Option<&str> {
        match self {
            RuleSetError::MalformedRuleDefinition { rule, .. }
            | RuleSetError::UnknownTable { rule, .. }
            | RuleSetError::UnknownField { rule, .. }
            | RuleSetError::InvalidTemplate { rule, .. } => Some(rule),
            RuleSetError::DuplicateRule(rule) => Some(rule),
            RuleSetError::Io { .. } | RuleSetError::Parse(_) => None,
        }
    }
}
