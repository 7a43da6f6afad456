use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Catalog name under which header fields are declared.
pub const HEADER_TABLE: &str = "LOAN_INFO";
pub const ID_FIELD: &str = "ID";
pub const NAME_FIELD: &str = "NAME";
pub const AMOUNT_FIELD: &str = "LLC_BI__AMOUNT__C";
pub const CLOSE_DATE_FIELD: &str = "LLC_BI__CLOSEDATE__C";
pub const LOAN_TYPE_FIELD: &str = "LOAN_TYPE";
pub const PAYMENT_TYPE_FIELD: &str = "PAYMENT_TYPE";
pub const PAYMENT_TABLE: &str = "PAYMENT";
pub const PAYMENT_ROW_TYPE_FIELD: &str = "LLC_BI__PAYMENT_TYPE__C";

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
const TABLE_SUFFIX: &str = "_DETAILS";

static ABSENT: FieldValue = FieldValue::Absent;

/// Identifier wrapper for fetched loans.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(pub String);

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single scalar value held by a header or row field.
///
/// `Absent` is distinct from zero and from the empty string: required checks
/// treat absent and blank text as missing, never a legitimate `0`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Absent,
    Number(f64),
    Text(String),
    Date(NaiveDate),
    Flag(bool),
}

impl FieldValue {
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Absent),
            Value::Bool(flag) => Some(Self::Flag(flag)),
            Value::Number(number) => number.as_f64().map(Self::Number),
            Value::String(text) => Some(Self::Text(text)),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Absent, or text that is empty once trimmed.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Absent => true,
            Self::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(number) if number.is_finite() => Some(*number),
            Self::Text(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|number| number.is_finite()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        self.as_date_with(DATE_FORMAT)
    }

    pub fn as_date_with(&self, format: &str) -> Option<NaiveDate> {
        match self {
            Self::Date(date) => Some(*date),
            Self::Text(text) => NaiveDate::parse_from_str(text.trim(), format).ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Orders two values as numbers, then dates, then flags, then case-insensitive text.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        if self.is_absent() || other.is_absent() {
            return None;
        }
        if let (Some(left), Some(right)) = (self.as_number(), other.as_number()) {
            return left.partial_cmp(&right);
        }
        if let (Some(left), Some(right)) = (self.as_date(), other.as_date()) {
            return Some(left.cmp(&right));
        }
        match (self, other) {
            (Self::Flag(left), Self::Flag(right)) => Some(left.cmp(right)),
            (Self::Flag(flag), Self::Text(text)) => parse_flag(text).map(|other| flag.cmp(&other)),
            (Self::Text(text), Self::Flag(flag)) => parse_flag(text).map(|this| this.cmp(flag)),
            (Self::Text(left), Self::Text(right)) => Some(
                left.trim()
                    .to_lowercase()
                    .cmp(&right.trim().to_lowercase()),
            ),
            _ => None,
        }
    }

    pub fn loosely_equals(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// Human readable rendering used in finding messages.
    pub fn render(&self) -> String {
        match self {
            Self::Absent => "(blank)".to_string(),
            Self::Number(number) => format_amount(*number),
            Self::Text(text) => text.clone(),
            Self::Date(date) => date.format(DATE_FORMAT).to_string(),
            Self::Flag(flag) => flag.to_string(),
        }
    }
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

/// Renders `6950000.0` as `6,950,000.00`.
pub(crate) fn format_amount(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 && fixed.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    format!("{sign}{grouped}.{fraction}")
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Absent => serializer.serialize_none(),
            Self::Number(number) => serializer.serialize_f64(*number),
            Self::Text(text) => serializer.serialize_str(text),
            Self::Date(date) => serializer.serialize_str(&date.format(DATE_FORMAT).to_string()),
            Self::Flag(flag) => serializer.serialize_bool(*flag),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Self::from_json(raw).ok_or_else(|| {
            serde::de::Error::custom("expected a scalar value (null, bool, number or string)")
        })
    }
}

/// Anything rule conditions can read fields from.
pub trait FieldLookup {
    fn field(&self, name: &str) -> &FieldValue;
}

/// Loan classification used to gate rule applicability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanType {
    Senior,
    Mezzanine,
    Preferred,
    ATranche,
    BTranche,
    Other,
}

impl LoanType {
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();

        match normalized.as_str() {
            "senior" => Some(Self::Senior),
            "mezz" | "mezzanine" => Some(Self::Mezzanine),
            "preferred" | "preferredequity" | "pref" => Some(Self::Preferred),
            "atranche" => Some(Self::ATranche),
            "btranche" => Some(Self::BTranche),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Infers the loan type from a display name such as `"Canyon Valley - Mezz"`.
    pub fn infer_from_name(name: &str) -> Self {
        if let Some(tranche) = tranche_letter(name) {
            return match tranche {
                'A' => Self::ATranche,
                _ => Self::BTranche,
            };
        }

        let lowered = name.to_ascii_lowercase();
        if lowered.contains("mezz") {
            Self::Mezzanine
        } else if lowered.contains("preferred") {
            Self::Preferred
        } else if lowered.contains("senior") {
            Self::Senior
        } else {
            Self::Other
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Senior => "Senior",
            Self::Mezzanine => "Mezzanine",
            Self::Preferred => "Preferred",
            Self::ATranche => "A-Tranche",
            Self::BTranche => "B-Tranche",
            Self::Other => "Other",
        }
    }
}

/// Finds `A` or `B` followed by optional spaces/hyphens and then `tranche`.
fn tranche_letter(name: &str) -> Option<char> {
    let chars: Vec<char> = name.chars().collect();
    for (index, letter) in chars.iter().enumerate() {
        if *letter != 'A' && *letter != 'B' {
            continue;
        }
        let rest: String = chars[index + 1..]
            .iter()
            .skip_while(|c| c.is_whitespace() || **c == '-')
            .take(7)
            .collect();
        if rest.eq_ignore_ascii_case("tranche") {
            return Some(*letter);
        }
    }
    None
}

/// Repayment profile of the loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    InterestOnly,
    PrincipalAndInterest,
    Mixed,
    None,
}

impl PaymentType {
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_ascii_lowercase();
        if lowered.is_empty() || lowered == "none" {
            return Some(Self::None);
        }
        if lowered == "mixed" {
            return Some(Self::Mixed);
        }
        if lowered.contains("principal") {
            return Some(Self::PrincipalAndInterest);
        }
        if lowered.contains("interest") {
            return Some(Self::InterestOnly);
        }
        None
    }

    /// Collapses per-stream payment types into a single loan-level profile.
    fn from_streams(rows: &[Row]) -> Self {
        let mut seen: Option<Self> = None;
        for row in rows {
            let Some(kind) = row
                .field(PAYMENT_ROW_TYPE_FIELD)
                .as_text()
                .and_then(Self::parse)
            else {
                continue;
            };
            seen = match seen {
                None => Some(kind),
                Some(previous) if previous == kind => Some(previous),
                Some(_) => return Self::Mixed,
            };
        }
        seen.unwrap_or(Self::None)
    }
}

/// One row of a named table collection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    id: Option<String>,
    fields: BTreeMap<String, FieldValue>,
}

impl Row {
    pub fn new(fields: BTreeMap<String, FieldValue>) -> Self {
        let id = required_text(&fields, ID_FIELD).ok();
        Self { id, fields }
    }

    /// Row identifier, numeric ids rendered as text.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn from_json(table: &str, index: usize, value: Value) -> Result<Self, RecordError> {
        let Value::Object(map) = value else {
            return Err(RecordError::InvalidRow {
                table: table.to_string(),
                index,
            });
        };
        Ok(Self::new(scalar_fields(map)?))
    }
}

impl FieldLookup for Row {
    fn field(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&ABSENT)
    }
}

/// Scalar header fields of a loan.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanHeader {
    id: LoanId,
    name: String,
    loan_type: LoanType,
    payment_type: PaymentType,
    fields: BTreeMap<String, FieldValue>,
}

impl LoanHeader {
    pub fn new(fields: BTreeMap<String, FieldValue>) -> Result<Self, RecordError> {
        let id = required_text(&fields, ID_FIELD)?;
        let name = required_text(&fields, NAME_FIELD)?;

        let loan_type = fields
            .get(LOAN_TYPE_FIELD)
            .and_then(FieldValue::as_text)
            .and_then(LoanType::parse)
            .unwrap_or_else(|| LoanType::infer_from_name(&name));

        let payment_type = fields
            .get(PAYMENT_TYPE_FIELD)
            .and_then(FieldValue::as_text)
            .and_then(PaymentType::parse)
            .unwrap_or(PaymentType::None);

        Ok(Self {
            id: LoanId(id),
            name,
            loan_type,
            payment_type,
            fields,
        })
    }

    pub fn id(&self) -> &LoanId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn loan_type(&self) -> LoanType {
        self.loan_type
    }

    pub fn payment_type(&self) -> PaymentType {
        self.payment_type
    }

    pub fn amount(&self) -> Option<f64> {
        self.field(AMOUNT_FIELD).as_number()
    }

    /// Close date as `YYYY-MM-DD`, or the raw text when it does not parse.
    pub fn close_date(&self) -> Option<String> {
        let value = self.field(CLOSE_DATE_FIELD);
        match value.as_date() {
            Some(date) => Some(date.format(DATE_FORMAT).to_string()),
            None if value.is_blank() => None,
            None => Some(value.render()),
        }
    }
}

impl FieldLookup for LoanHeader {
    fn field(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&ABSENT)
    }
}

/// A fetched loan: header fields plus its named row collections.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanRecord {
    header: LoanHeader,
    tables: BTreeMap<String, Vec<Row>>,
}

impl LoanRecord {
    pub fn new(mut header: LoanHeader, tables: BTreeMap<String, Vec<Row>>) -> Self {
        if header.field(PAYMENT_TYPE_FIELD).is_blank() {
            if let Some(rows) = tables.get(PAYMENT_TABLE) {
                header.payment_type = PaymentType::from_streams(rows);
            }
        }
        Self { header, tables }
    }

    /// Builds a record from the data source's JSON shape: flat header fields plus
    /// `<TABLE>_DETAILS` arrays. Keys are upper-cased, so two keys differing
    /// only by case are rejected.
    pub fn from_payload(payload: Value) -> Result<Self, RecordError> {
        let Value::Object(map) = payload else {
            return Err(RecordError::NotAnObject);
        };

        let mut header_fields = serde_json::Map::new();
        let mut tables = BTreeMap::new();

        for (key, value) in map {
            let key = key.to_ascii_uppercase();
            let table = key.strip_suffix(TABLE_SUFFIX).map(str::to_string);
            match (table, value) {
                (Some(table), Value::Array(items)) => {
                    let rows = items
                        .into_iter()
                        .enumerate()
                        .map(|(index, item)| Row::from_json(&table, index, item))
                        .collect::<Result<Vec<_>, _>>()?;
                    if tables.insert(table, rows).is_some() {
                        return Err(RecordError::DuplicateField { field: key });
                    }
                }
                (_, value) => {
                    if header_fields.contains_key(&key) {
                        return Err(RecordError::DuplicateField { field: key });
                    }
                    header_fields.insert(key, value);
                }
            }
        }

        let header = LoanHeader::new(scalar_fields(header_fields)?)?;
        Ok(Self::new(header, tables))
    }

    pub fn header(&self) -> &LoanHeader {
        &self.header
    }

    pub fn id(&self) -> &LoanId {
        self.header.id()
    }

    /// Rows of the named table, or an empty slice when the table is absent.
    pub fn table(&self, name: &str) -> &[Row] {
        self.tables.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

impl FieldLookup for LoanRecord {
    fn field(&self, name: &str) -> &FieldValue {
        self.header.field(name)
    }
}

impl TryFrom<Value> for LoanRecord {
    type Error = RecordError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_payload(value)
    }
}

fn scalar_fields(
    map: serde_json::Map<String, Value>,
) -> Result<BTreeMap<String, FieldValue>, RecordError> {
    let mut fields = BTreeMap::new();
    for (key, value) in map {
        let key = key.to_ascii_uppercase();
        if fields.contains_key(&key) {
            return Err(RecordError::DuplicateField { field: key });
        }
        let field = FieldValue::from_json(value)
            .ok_or_else(|| RecordError::UnsupportedValue { field: key.clone() })?;
        fields.insert(key, field);
    }
    Ok(fields)
}

fn required_text(
    fields: &BTreeMap<String, FieldValue>,
    name: &'static str,
) -> Result<String, RecordError> {
    match fields.get(name) {
        Some(FieldValue::Text(text)) if !text.trim().is_empty() => Ok(text.clone()),
        Some(FieldValue::Number(number)) => Ok(number.to_string()),
        _ => Err(RecordError::MissingField(name)),
    }
}

/// Raised when a payload cannot be turned into a [`LoanRecord`].
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("loan payload must be a JSON object")]
    NotAnObject,
    #[error("loan payload is missing required field {0}")]
    MissingField(&'static str),
    #[error("field {field} holds a nested value that cannot be validated")]
    UnsupportedValue { field: String },
    #[error("row {index} of table {table} must be a JSON object")]
    InvalidRow { table: String, index: usize },
    #[error("field {field} appears more than once when keys are upper-cased")]
    DuplicateField { field: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_is_distinct_from_zero_and_empty_text() {
        assert!(FieldValue::Absent.is_blank());
        assert!(FieldValue::text("  ").is_blank());
        assert!(!FieldValue::Number(0.0).is_blank());
        assert_eq!(FieldValue::Number(0.0).as_number(), Some(0.0));
        assert_eq!(FieldValue::Absent.as_number(), None);
    }

    #[test]
    fn payload_tables_are_split_from_header_fields() {
        let record = LoanRecord::from_payload(json!({
            "id": "a0i-1",
            "NAME": "Canyon Valley - Mezz",
            "LLC_BI__AMOUNT__C": 7000000,
            "DRAW_DETAILS": [
                { "ID": "d-1", "LLC_BI__AMOUNT__C": 3000000 },
                { "ID": "d-2", "LLC_BI__AMOUNT__C": "4000000" }
            ]
        }))
        .expect("payload parses");

        assert_eq!(record.id(), &LoanId("a0i-1".to_string()));
        assert_eq!(record.header().loan_type(), LoanType::Mezzanine);
        assert_eq!(record.header().amount(), Some(7_000_000.0));
        assert_eq!(record.table("DRAW").len(), 2);
        assert_eq!(record.table("DRAW")[1].id(), Some("d-2"));
        assert_eq!(
            record.table("DRAW")[1].field(AMOUNT_FIELD).as_number(),
            Some(4_000_000.0)
        );
        assert!(record.table("FEE").is_empty());
        assert!(record.field("DRAW_DETAILS").is_absent());
    }

    #[test]
    fn payload_without_name_is_rejected() {
        let err = LoanRecord::from_payload(json!({ "ID": "a0i-1" })).unwrap_err();
        assert!(matches!(err, RecordError::MissingField(NAME_FIELD)));
    }

    #[test]
    fn nested_header_values_are_rejected() {
        let err = LoanRecord::from_payload(json!({
            "ID": "a0i-1",
            "NAME": "Loan",
            "EXTRA": { "nested": true }
        }))
        .unwrap_err();
        assert!(matches!(err, RecordError::UnsupportedValue { field } if field == "EXTRA"));
    }

    #[test]
    fn numeric_row_ids_are_rendered_as_text() {
        let record = LoanRecord::from_payload(json!({
            "ID": "a0i-1",
            "NAME": "Loan",
            "DRAW_DETAILS": [{ "ID": 17 }, { "ID": "  " }, {}]
        }))
        .expect("payload parses");

        let ids: Vec<Option<&str>> = record.table("DRAW").iter().map(Row::id).collect();
        assert_eq!(ids, vec![Some("17"), None, None]);
    }

    #[test]
    fn keys_differing_only_by_case_are_rejected() {
        let err = LoanRecord::from_payload(json!({
            "id": "a0i-1",
            "ID": "a0i-2",
            "NAME": "Loan"
        }))
        .unwrap_err();
        assert!(matches!(err, RecordError::DuplicateField { field } if field == "ID"));

        let err = LoanRecord::from_payload(json!({
            "ID": "a0i-1",
            "NAME": "Loan",
            "DRAW_DETAILS": [{ "id": "d-1", "ID": "d-2" }]
        }))
        .unwrap_err();
        assert!(matches!(err, RecordError::DuplicateField { field } if field == "ID"));

        let err = LoanRecord::from_payload(json!({
            "ID": "a0i-1",
            "NAME": "Loan",
            "draw_details": [],
            "DRAW_DETAILS": []
        }))
        .unwrap_err();
        assert!(matches!(err, RecordError::DuplicateField { field } if field == "DRAW_DETAILS"));
    }

    #[test]
    fn infers_tranche_and_equity_loan_types_from_names() {
        assert_eq!(LoanType::infer_from_name("Harbor Point A-Tranche"), LoanType::ATranche);
        assert_eq!(LoanType::infer_from_name("Harbor Point B Tranche"), LoanType::BTranche);
        assert_eq!(LoanType::infer_from_name("Harbor Point Btranche"), LoanType::BTranche);
        assert_eq!(
            LoanType::infer_from_name("Vitalia Stow - Preferred Equity"),
            LoanType::Preferred
        );
        assert_eq!(LoanType::infer_from_name("Main Street Senior"), LoanType::Senior);
        assert_eq!(LoanType::infer_from_name("Plain Loan"), LoanType::Other);
    }

    #[test]
    fn explicit_loan_type_overrides_inference() {
        let record = LoanRecord::from_payload(json!({
            "ID": "a0i-1",
            "NAME": "Canyon Valley - Mezz",
            "LOAN_TYPE": "Senior"
        }))
        .expect("payload parses");
        assert_eq!(record.header().loan_type(), LoanType::Senior);
    }

    #[test]
    fn payment_type_is_derived_from_payment_streams() {
        let record = LoanRecord::from_payload(json!({
            "ID": "a0i-1",
            "NAME": "Loan",
            "PAYMENT_DETAILS": [
                { "ID": "p-1", "LLC_BI__PAYMENT_TYPE__C": "Interest Only" },
                { "ID": "p-2", "LLC_BI__PAYMENT_TYPE__C": "Principal & Interest" }
            ]
        }))
        .expect("payload parses");
        assert_eq!(record.header().payment_type(), PaymentType::Mixed);
    }

    #[test]
    fn formats_amounts_with_grouping() {
        assert_eq!(format_amount(6_950_000.0), "6,950,000.00");
        assert_eq!(format_amount(999.5), "999.50");
        assert_eq!(format_amount(-1234.0), "-1,234.00");
        assert_eq!(format_amount(0.0), "0.00");
    }

    #[test]
    fn close_date_echoes_raw_text_when_unparseable() {
        let record = LoanRecord::from_payload(json!({
            "ID": "a0i-1",
            "NAME": "Loan",
            "LLC_BI__CLOSEDATE__C": "03/15/2024"
        }))
        .expect("payload parses");
        assert_eq!(record.header().close_date().as_deref(), Some("03/15/2024"));
    }

    #[test]
    fn values_compare_across_numeric_text() {
        assert_eq!(
            FieldValue::Number(10.0).compare(&FieldValue::text("10")),
            Some(Ordering::Equal)
        );
        assert!(FieldValue::text("Fixed").loosely_equals(&FieldValue::text("fixed")));
        assert_eq!(FieldValue::Absent.compare(&FieldValue::Absent), None);
    }
}
