use crate::validation::record::FieldValue;
use crate::validation::rules::Check;

/// Applies `check` to `subject`, comparing against `against` where the check needs it.
///
/// Unparseable numbers or dates fail the check. Blank operands fail comparison
/// checks unless the rule sets `allow_absent`.
pub(super) fn passes(check: &Check, subject: &FieldValue, against: Option<&FieldValue>) -> bool {
    match check {
        Check::Required => !subject.is_blank(),
        Check::NumericFormat => subject.is_blank() || subject.as_number().is_some(),
        Check::DateFormat { format } => {
            subject.is_blank() || subject.as_date_with(format).is_some()
        }
        Check::NumericMatch {
            tolerance,
            allow_absent,
            ..
        } => compare(subject, against, *allow_absent, |left, right| {
            match (left.as_number(), right.as_number()) {
                (Some(left), Some(right)) => tolerance.allows(left, right),
                _ => false,
            }
        }),
        Check::Relational {
            op, allow_absent, ..
        } => compare(subject, against, *allow_absent, |left, right| {
            left.compare(right).is_some_and(|ordering| op.holds(ordering))
        }),
        Check::OneOf {
            values,
            allow_absent,
        } => {
            if subject.is_blank() {
                *allow_absent
            } else {
                values.iter().any(|allowed| subject.loosely_equals(allowed))
            }
        }
        Check::DateOrder {
            op, allow_absent, ..
        } => compare(subject, against, *allow_absent, |left, right| {
            match (left.as_date(), right.as_date()) {
                (Some(left), Some(right)) => op.holds(left.cmp(&right)),
                _ => false,
            }
        }),
    }
}

fn compare(
    subject: &FieldValue,
    against: Option<&FieldValue>,
    allow_absent: bool,
    test: impl FnOnce(&FieldValue, &FieldValue) -> bool,
) -> bool {
    match against {
        Some(against) if !subject.is_blank() && !against.is_blank() => test(subject, against),
        _ => allow_absent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::rules::{RelationalOp, Tolerance};

    fn date_order(op: RelationalOp, allow_absent: bool) -> Check {
        Check::DateOrder {
            op,
            against: None,
            allow_absent,
        }
    }

    #[test]
    fn required_treats_zero_as_present() {
        assert!(passes(&Check::Required, &FieldValue::Number(0.0), None));
        assert!(!passes(&Check::Required, &FieldValue::text(" "), None));
        assert!(!passes(&Check::Required, &FieldValue::Absent, None));
    }

    #[test]
    fn unparseable_dates_fail_date_order() {
        let check = date_order(RelationalOp::Ge, false);
        let later = FieldValue::text("2024-06-30");
        let earlier = FieldValue::text("2024-01-01");
        assert!(passes(&check, &later, Some(&earlier)));
        assert!(!passes(&check, &earlier, Some(&later)));
        assert!(!passes(&check, &FieldValue::text("30/06/2024"), Some(&earlier)));
    }

    #[test]
    fn absent_operands_fail_unless_allowed() {
        let date = FieldValue::text("2024-01-01");
        assert!(!passes(&date_order(RelationalOp::Gt, false), &FieldValue::Absent, Some(&date)));
        assert!(passes(&date_order(RelationalOp::Gt, true), &FieldValue::Absent, Some(&date)));
    }

    #[test]
    fn numeric_match_rejects_text_amounts() {
        let check = Check::NumericMatch {
            against: None,
            tolerance: Tolerance::Absolute { amount: 0.01 },
            allow_absent: false,
        };
        let target = FieldValue::Number(7_000_000.0);
        assert!(passes(&check, &FieldValue::Number(7_000_000.005), Some(&target)));
        assert!(!passes(&check, &FieldValue::text("seven million"), Some(&target)));
    }

    #[test]
    fn one_of_compares_case_insensitively() {
        let check = Check::OneOf {
            values: vec![FieldValue::text("Monthly"), FieldValue::text("Quarterly")],
            allow_absent: true,
        };
        assert!(passes(&check, &FieldValue::text("monthly"), None));
        assert!(passes(&check, &FieldValue::Absent, None));
        assert!(!passes(&check, &FieldValue::text("Weekly"), None));
    }

    #[test]
    fn format_checks_pass_on_blank_values() {
        assert!(passes(&Check::NumericFormat, &FieldValue::Absent, None));
        assert!(!passes(&Check::NumericFormat, &FieldValue::text("12a"), None));
        let check = Check::DateFormat {
            format: "%Y-%m-%d".to_string(),
        };
        assert!(passes(&check, &FieldValue::text("2024-02-29"), None));
        assert!(!passes(&check, &FieldValue::text("2023-02-29"), None));
    }
}
