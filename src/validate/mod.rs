//! Record validator: apply a rule set to every record.
//!
//! Pure logic, no I/O. Every rule is evaluated independently against every
//! record (no short-circuit), and each rule yields at most one violation per
//! record. Violations keep rule declaration order.
//!
//! A rule that reads an absent field reports `missing_field` instead of
//! evaluating, unless the rule allows missing values. Each absent field is
//! reported once per record, at the first rule that reads it.

use std::collections::{BTreeMap, HashSet};

use crate::domain::{Cell, Record, RecordId, Violation, ViolationKind};
use crate::rules::{DateRelation, Rule, RuleKind, RuleSet};

/// Validate all records. The result has exactly one entry per record.
pub fn validate(records: &[Record], rules: &RuleSet) -> BTreeMap<RecordId, Vec<Violation>> {
    records
        .iter()
        .map(|record| (record.id.clone(), validate_record(record, rules)))
        .collect()
}

/// Validate one record against every rule, in declaration order.
pub fn validate_record(record: &Record, rules: &RuleSet) -> Vec<Violation> {
    let mut out = Vec::new();
    let mut reported_missing: HashSet<&str> = HashSet::new();

    for rule in rules.iter() {
        let missing: Vec<&str> = rule
            .fields()
            .into_iter()
            .filter(|f| record.get(f).is_none())
            .collect();

        if !missing.is_empty() {
            if rule.allow_missing && !matches!(rule.kind, RuleKind::Required) {
                continue;
            }
            // One violation per rule: report the first absent field not yet reported.
            if let Some(field) = missing.into_iter().find(|f| !reported_missing.contains(f)) {
                reported_missing.insert(field);
                out.push(missing_field(record, rule, field));
            }
            continue;
        }

        if let Some(v) = evaluate(record, rule) {
            out.push(v);
        }
    }

    out
}

fn evaluate(record: &Record, rule: &Rule) -> Option<Violation> {
    let cell = record.get(&rule.field)?;

    match &rule.kind {
        RuleKind::Required => None,
        RuleKind::Range(bounds) => match cell.as_number() {
            Some(v) if bounds.contains(v) => None,
            Some(_) => Some(violation(record, rule, ViolationKind::Range, cell, rule.message.clone())),
            None => Some(violation(
                record,
                rule,
                ViolationKind::Range,
                cell,
                format!("{} (value is not numeric)", rule.message),
            )),
        },
        RuleKind::Pattern(re) => {
            if re.is_match(&cell.raw) {
                None
            } else {
                Some(violation(record, rule, ViolationKind::Pattern, cell, rule.message.clone()))
            }
        }
        RuleKind::AllowedValues { values, case_sensitive } => {
            let ok = if *case_sensitive {
                values.iter().any(|v| v == &cell.raw)
            } else {
                values.iter().any(|v| v.eq_ignore_ascii_case(&cell.raw))
            };
            if ok {
                None
            } else {
                Some(violation(record, rule, ViolationKind::AllowedValues, cell, rule.message.clone()))
            }
        }
        RuleKind::CrossField { reference, relation } => {
            let other = record.get(reference)?;
            match (cell.as_date(), other.as_date()) {
                (Some(a), Some(b)) => {
                    let ok = match relation {
                        DateRelation::OnOrAfter => a >= b,
                        DateRelation::OnOrBefore => a <= b,
                    };
                    if ok {
                        None
                    } else {
                        Some(Violation {
                            observed: Some(format!("{} {} {}", cell.raw, relation.symbol(), other.raw)),
                            ..violation(record, rule, ViolationKind::CrossField, cell, rule.message.clone())
                        })
                    }
                }
                _ => Some(Violation {
                    observed: Some(format!("{} / {}", cell.raw, other.raw)),
                    ..violation(
                        record,
                        rule,
                        ViolationKind::CrossField,
                        cell,
                        format!("{} (value is not a date)", rule.message),
                    )
                }),
            }
        }
    }
}

fn violation(record: &Record, rule: &Rule, kind: ViolationKind, cell: &Cell, message: String) -> Violation {
    Violation {
        record_id: record.id.clone(),
        rule_id: rule.id.clone(),
        field: rule.field.clone(),
        kind,
        severity: rule.severity,
        observed: Some(cell.raw.clone()),
        message,
    }
}

fn missing_field(record: &Record, rule: &Rule, field: &str) -> Violation {
    let message = match rule.kind {
        RuleKind::Required => rule.message.clone(),
        _ => format!("{field} is missing (needed by rule {}).", rule.id),
    };
    Violation {
        record_id: record.id.clone(),
        rule_id: rule.id.clone(),
        field: field.to_string(),
        kind: ViolationKind::MissingField,
        severity: rule.severity,
        observed: None,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(json: &str) -> RuleSet {
        RuleSet::load_str(json).unwrap()
    }

    fn age_rules() -> RuleSet {
        rules(r#"{ "rules": [ { "id": "AGE", "field": "age", "kind": "range", "min": 18, "max": 100 } ] }"#)
    }

    fn valid_record(id: &str) -> Record {
        Record::new(id)
            .with("age", "45")
            .with("systolic_bp", "120")
            .with("treatment_dose", "50")
            .with("visit_date", "2024-03-01")
            .with("sex", "F")
            .with("start_date", "2024-01-10")
            .with("end_date", "2024-02-10")
    }

    #[test]
    fn valid_records_have_no_violations() {
        let set = RuleSet::default_clinical().unwrap();
        let records = vec![valid_record("S1"), valid_record("S2").with("sex", "M")];
        let out = validate(&records, &set);
        assert_eq!(out.len(), 2);
        assert!(out.values().all(Vec::is_empty), "{out:?}");
    }

    #[test]
    fn age_boundaries_are_inclusive() {
        let set = age_rules();
        for (age, expected) in [("17", 1), ("18", 0), ("100", 0), ("101", 1)] {
            let v = validate_record(&Record::new("S").with("age", age), &set);
            assert_eq!(v.len(), expected, "age={age}");
            if expected == 1 {
                assert_eq!(v[0].kind, ViolationKind::Range);
                assert_eq!(v[0].observed.as_deref(), Some(age));
            }
        }
    }

    #[test]
    fn non_numeric_value_is_a_range_violation() {
        let v = validate_record(&Record::new("S").with("age", "forty"), &age_rules());
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].kind, ViolationKind::Range);
        assert!(v[0].message.contains("not numeric"));
    }

    #[test]
    fn missing_required_field_yields_one_missing_field_violation() {
        let set = RuleSet::default_clinical().unwrap();
        let mut record = valid_record("S1");
        record.set("systolic_bp", "");

        let v = validate_record(&record, &set);
        assert_eq!(v.len(), 1, "{v:?}");
        assert_eq!(v[0].kind, ViolationKind::MissingField);
        assert_eq!(v[0].field, "systolic_bp");
        assert_eq!(v[0].rule_id, "EDC_BP_001");
    }

    #[test]
    fn missing_field_on_non_required_rule_does_not_crash() {
        let v = validate_record(&Record::new("S").with("sex", "F"), &age_rules());
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].kind, ViolationKind::MissingField);
        assert_eq!(v[0].field, "age");
    }

    #[test]
    fn allow_missing_skips_absent_fields() {
        let set = rules(
            r#"{ "rules": [
                { "field": "end_date", "kind": "cross_field", "reference": "start_date",
                  "relation": "on_or_after", "allow_missing": true }
            ] }"#,
        );
        let v = validate_record(&Record::new("S").with("start_date", "2024-01-01"), &set);
        assert!(v.is_empty());
    }

    #[test]
    fn cross_field_date_order() {
        let set = rules(
            r#"{ "rules": [
                { "field": "end_date", "kind": "cross_field", "reference": "start_date", "relation": "on_or_after" }
            ] }"#,
        );
        let same_day = Record::new("A")
            .with("start_date", "2024-01-01")
            .with("end_date", "2024-01-01");
        assert!(validate_record(&same_day, &set).is_empty());

        let inverted = Record::new("B")
            .with("start_date", "2024-02-01")
            .with("end_date", "2024-01-01");
        let v = validate_record(&inverted, &set);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].kind, ViolationKind::CrossField);
        assert_eq!(v[0].observed.as_deref(), Some("2024-01-01 >= 2024-02-01"));

        let garbage = Record::new("C")
            .with("start_date", "2024-02-01")
            .with("end_date", "soon");
        let v = validate_record(&garbage, &set);
        assert_eq!(v.len(), 1);
        assert!(v[0].message.contains("not a date"));

        let day_first = Record::new("D")
            .with("start_date", "2024-02-01")
            .with("end_date", "03/04/2024");
        let v = validate_record(&day_first, &set);
        assert_eq!(v.len(), 1);
        assert!(v[0].message.contains("not a date"));
    }

    #[test]
    fn every_rule_is_evaluated_in_declaration_order() {
        let set = RuleSet::default_clinical().unwrap();
        let record = valid_record("S1")
            .with("age", "150")
            .with("visit_date", "01/03/2024")
            .with("sex", "X")
            .with("end_date", "2023-12-31");

        let ids: Vec<String> = validate_record(&record, &set)
            .into_iter()
            .map(|v| v.rule_id)
            .collect();
        assert_eq!(ids, vec!["EDC_AGE_001", "EDC_VISIT_002", "EDC_SEX_001", "EDC_TRT_001"]);
    }

    #[test]
    fn absent_field_reported_once_across_rules() {
        let set = rules(
            r#"{ "rules": [
                { "field": "dose", "kind": "range", "min": 0 },
                { "field": "dose", "kind": "pattern", "pattern": "^[0-9.]+$" },
                { "field": "dose", "kind": "required" }
            ] }"#,
        );
        let v = validate_record(&Record::new("S"), &set);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].rule_id, "DOSE_RANGE_001");
    }

    #[test]
    fn allowed_values_case_handling() {
        let strict = rules(r#"{ "rules": [ { "field": "sex", "kind": "allowed_values", "values": ["M", "F"] } ] }"#);
        let loose = rules(
            r#"{ "rules": [ { "field": "sex", "kind": "allowed_values", "values": ["M", "F"], "case_sensitive": false } ] }"#,
        );
        let r = Record::new("S").with("sex", "f");
        assert_eq!(validate_record(&r, &strict).len(), 1);
        assert!(validate_record(&r, &loose).is_empty());
    }
}
