//! Built-in clinical rule set, used when no rules file is given.
//!
//! Mirrors the checks of the original DuckDB validator (age, blood pressure,
//! dose, visit date) plus the demographic and date-order checks of the SDTM
//! DM/AE subset.

use crate::domain::Severity;
use crate::error::AppError;
use crate::rules::registry::{DateRelation, RuleDef, RuleKindDef, RuleSet};

pub const ISO_DATE_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}$";

/// Numeric columns scored by the outlier estimator by default.
pub const DEFAULT_NUMERIC_FIELDS: [&str; 3] = ["age", "systolic_bp", "treatment_dose"];

impl RuleSet {
    pub fn default_clinical() -> Result<Self, AppError> {
        RuleSet::from_defs(default_rule_defs())
    }
}

fn def(id: &str, field: &str, kind: RuleKindDef, severity: Severity) -> RuleDef {
    RuleDef {
        id: Some(id.to_string()),
        field: field.to_string(),
        kind,
        severity: Some(severity),
        message: None,
        allow_missing: false,
    }
}

fn range(min: Option<f64>, max: Option<f64>, min_exclusive: bool) -> RuleKindDef {
    RuleKindDef::Range {
        min,
        max,
        min_exclusive,
        max_exclusive: false,
    }
}

pub fn default_rule_defs() -> Vec<RuleDef> {
    vec![
        def("EDC_AGE_001", "age", range(Some(18.0), Some(100.0), false), Severity::High),
        def("EDC_BP_001", "systolic_bp", RuleKindDef::Required, Severity::High),
        def("EDC_BP_002", "systolic_bp", range(Some(90.0), Some(180.0), false), Severity::Med),
        def("EDC_DOSE_001", "treatment_dose", RuleKindDef::Required, Severity::High),
        def("EDC_DOSE_002", "treatment_dose", range(Some(0.0), None, true), Severity::High),
        def("EDC_VISIT_001", "visit_date", RuleKindDef::Required, Severity::High),
        def(
            "EDC_VISIT_002",
            "visit_date",
            RuleKindDef::Pattern {
                pattern: ISO_DATE_PATTERN.to_string(),
            },
            Severity::Low,
        ),
        RuleDef {
            allow_missing: true,
            ..def(
                "EDC_SEX_001",
                "sex",
                RuleKindDef::AllowedValues {
                    values: vec!["M".to_string(), "F".to_string(), "U".to_string()],
                    case_sensitive: true,
                },
                Severity::Med,
            )
        },
        RuleDef {
            allow_missing: true,
            ..def(
                "EDC_TRT_001",
                "end_date",
                RuleKindDef::CrossField {
                    reference: "start_date".to_string(),
                    relation: DateRelation::OnOrAfter,
                },
                Severity::High,
            )
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleKind;

    #[test]
    fn default_set_compiles() {
        let set = RuleSet::default_clinical().unwrap();
        assert_eq!(set.len(), 9);
        assert_eq!(set.rules()[0].message, "age must be within [18, 100].");
        assert!(matches!(set.rules()[4].kind, RuleKind::Range(b) if b.min_exclusive));
    }

    #[test]
    fn default_numeric_fields_are_range_checked() {
        let set = RuleSet::default_clinical().unwrap();
        for field in DEFAULT_NUMERIC_FIELDS {
            assert!(
                set.iter()
                    .any(|r| r.field == field && matches!(r.kind, RuleKind::Range(_))),
                "{field}"
            );
        }
    }
}
