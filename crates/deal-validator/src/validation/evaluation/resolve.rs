use crate::validation::record::{FieldLookup, FieldValue, LoanRecord, Row, HEADER_TABLE};
use crate::validation::rules::{Condition, FieldCatalog, Operand, Reduction};

/// A value resolved for a check together with its display label.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Resolved {
    pub value: FieldValue,
    pub label: String,
}

/// The row a row-scoped operand reads from.
#[derive(Clone, Copy)]
pub(super) struct RowContext<'r> {
    pub table: &'r str,
    pub row: &'r Row,
}

pub(super) struct Resolver<'r> {
    record: &'r LoanRecord,
    catalog: &'r FieldCatalog,
}

impl<'r> Resolver<'r> {
    pub fn new(record: &'r LoanRecord, catalog: &'r FieldCatalog) -> Self {
        Self { record, catalog }
    }

    pub fn record(&self) -> &'r LoanRecord {
        self.record
    }

    pub fn header(&self, field: &str) -> Resolved {
        Resolved {
            value: self.record.field(field).clone(),
            label: self.catalog.display_name(HEADER_TABLE, field).to_string(),
        }
    }

    pub fn row(&self, context: RowContext<'_>, field: &str) -> Resolved {
        Resolved {
            value: context.row.field(field).clone(),
            label: self.catalog.display_name(context.table, field).to_string(),
        }
    }

    /// Rows of `table` that pass the optional row filter.
    pub fn rows(
        &self,
        table: &str,
        only_when: Option<&'r Condition>,
    ) -> impl Iterator<Item = &'r Row> + 'r {
        let rows = self.record.table(table);
        rows.iter()
            .filter(move |row| only_when.map_or(true, |condition| condition.holds(*row)))
    }

    /// `None` when no row qualifies, except for `count` which yields zero.
    pub fn aggregate(
        &self,
        table: &str,
        field: &str,
        reduction: Reduction,
        only_when: Option<&'r Condition>,
    ) -> Option<Resolved> {
        let rows: Vec<&Row> = self.rows(table, only_when).collect();
        if rows.is_empty() && reduction != Reduction::Count {
            return None;
        }

        Some(Resolved {
            value: reduce(&rows, field, reduction),
            label: self.aggregate_label(table, field, reduction),
        })
    }

    pub fn aggregate_label(&self, table: &str, field: &str, reduction: Reduction) -> String {
        format!(
            "{} {}",
            reduction.label(),
            self.catalog.display_name(table, field)
        )
    }

    pub fn operand(&self, operand: &'r Operand, row: Option<RowContext<'_>>) -> Resolved {
        match operand {
            Operand::Literal { value } => Resolved {
                value: value.clone(),
                label: value.render(),
            },
            Operand::HeaderField { field } => self.header(field),
            Operand::RowField { table, field } => match row {
                Some(context) => self.row(context, field),
                None => Resolved {
                    value: FieldValue::Absent,
                    label: table
                        .as_deref()
                        .map(|table| self.catalog.display_name(table, field))
                        .unwrap_or(field)
                        .to_string(),
                },
            },
            Operand::Aggregate {
                table,
                field,
                reduction,
                only_when,
            } => self
                .aggregate(table, field, *reduction, only_when.as_ref())
                .unwrap_or_else(|| Resolved {
                    value: FieldValue::Absent,
                    label: self.aggregate_label(table, field, *reduction),
                }),
        }
    }
}

/// Blank members are skipped; a member that is not numeric makes the whole
/// reduction non-numeric so that the check fails instead of silently ignoring it.
/// Apart from `Count`, a column with no present member reduces to `Absent`.
fn reduce(rows: &[&Row], field: &str, reduction: Reduction) -> FieldValue {
    let mut present = 0usize;
    let mut numbers = Vec::with_capacity(rows.len());

    for row in rows {
        let value = row.field(field);
        if value.is_blank() {
            continue;
        }
        present += 1;
        match value.as_number() {
            Some(number) => numbers.push(number),
            None if reduction == Reduction::Count => {}
            None => return FieldValue::Text(value.render()),
        }
    }

    match reduction {
        Reduction::Count => FieldValue::Number(present as f64),
        Reduction::Sum if numbers.is_empty() => FieldValue::Absent,
        Reduction::Sum => FieldValue::Number(numbers.iter().sum()),
        Reduction::Min => numbers
            .into_iter()
            .reduce(f64::min)
            .map_or(FieldValue::Absent, FieldValue::Number),
        Reduction::Max => numbers
            .into_iter()
            .reduce(f64::max)
            .map_or(FieldValue::Absent, FieldValue::Number),
    }
}
