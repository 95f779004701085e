//! Rule registry: load, check and compile rule definitions.
//!
//! Rule files are JSON:
//!
//! ```text
//! {
//!   "rules": [
//!     { "field": "age", "kind": "range", "min": 18, "max": 100 },
//!     { "field": "visit_date", "kind": "required", "severity": "high" },
//!     { "field": "end_date", "kind": "cross_field",
//!       "reference": "start_date", "relation": "on_or_after", "allow_missing": true }
//!   ]
//! }
//! ```
//!
//! Loading is all-or-nothing: the first malformed definition fails the load
//! with `AppError::Config`, and nothing downstream ever sees a partial set.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::Severity;
use crate::error::AppError;

/// On-disk rules file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleFile {
    pub rules: Vec<RuleDef>,
}

/// One rule as written in a rules file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub field: String,
    #[serde(flatten)]
    pub kind: RuleKindDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Skip the rule (instead of reporting a missing field) when a referenced
    /// field is absent.
    #[serde(default, skip_serializing_if = "is_false")]
    pub allow_missing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKindDef {
    Required,
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        #[serde(default, skip_serializing_if = "is_false")]
        min_exclusive: bool,
        #[serde(default, skip_serializing_if = "is_false")]
        max_exclusive: bool,
    },
    Pattern {
        pattern: String,
    },
    AllowedValues {
        values: Vec<String>,
        #[serde(default = "default_true", skip_serializing_if = "is_true")]
        case_sensitive: bool,
    },
    CrossField {
        reference: String,
        relation: DateRelation,
    },
}

/// Ordering required between `field` and `reference` in a cross-field rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRelation {
    /// `field >= reference`
    OnOrAfter,
    /// `field <= reference`
    OnOrBefore,
}

impl DateRelation {
    pub fn symbol(self) -> &'static str {
        match self {
            DateRelation::OnOrAfter => ">=",
            DateRelation::OnOrBefore => "<=",
        }
    }
}

/// Numeric bounds of a range rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_exclusive: bool,
    pub max_exclusive: bool,
}

impl RangeBounds {
    pub fn contains(&self, v: f64) -> bool {
        let above_min = match self.min {
            Some(min) if self.min_exclusive => v > min,
            Some(min) => v >= min,
            None => true,
        };
        let below_max = match self.max {
            Some(max) if self.max_exclusive => v < max,
            Some(max) => v <= max,
            None => true,
        };
        above_min && below_max
    }

    /// Human-readable interval, e.g. `[18, 100]` or `(0, +inf)`.
    pub fn describe(&self) -> String {
        let lo = match self.min {
            Some(min) => format!("{}{}", if self.min_exclusive { "(" } else { "[" }, fmt_bound(min)),
            None => "(-inf".to_string(),
        };
        let hi = match self.max {
            Some(max) => format!("{}{}", fmt_bound(max), if self.max_exclusive { ")" } else { "]" }),
            None => "+inf)".to_string(),
        };
        format!("{lo}, {hi}")
    }
}

fn fmt_bound(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Compiled rule kind.
#[derive(Debug, Clone)]
pub enum RuleKind {
    Required,
    Range(RangeBounds),
    Pattern(Regex),
    AllowedValues { values: Vec<String>, case_sensitive: bool },
    CrossField { reference: String, relation: DateRelation },
}

impl RuleKind {
    pub fn tag(&self) -> &'static str {
        match self {
            RuleKind::Required => "required",
            RuleKind::Range(_) => "range",
            RuleKind::Pattern(_) => "pattern",
            RuleKind::AllowedValues { .. } => "allowed_values",
            RuleKind::CrossField { .. } => "cross_field",
        }
    }
}

/// A checked, ready-to-evaluate rule. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub field: String,
    pub kind: RuleKind,
    pub severity: Severity,
    pub message: String,
    pub allow_missing: bool,
}

impl Rule {
    /// Fields this rule reads, primary field first.
    pub fn fields(&self) -> Vec<&str> {
        match &self.kind {
            RuleKind::CrossField { reference, .. } => vec![self.field.as_str(), reference.as_str()],
            _ => vec![self.field.as_str()],
        }
    }

    pub fn to_def(&self) -> RuleDef {
        let kind = match &self.kind {
            RuleKind::Required => RuleKindDef::Required,
            RuleKind::Range(b) => RuleKindDef::Range {
                min: b.min,
                max: b.max,
                min_exclusive: b.min_exclusive,
                max_exclusive: b.max_exclusive,
            },
            RuleKind::Pattern(re) => RuleKindDef::Pattern {
                pattern: re.as_str().to_string(),
            },
            RuleKind::AllowedValues { values, case_sensitive } => RuleKindDef::AllowedValues {
                values: values.clone(),
                case_sensitive: *case_sensitive,
            },
            RuleKind::CrossField { reference, relation } => RuleKindDef::CrossField {
                reference: reference.clone(),
                relation: *relation,
            },
        };
        RuleDef {
            id: Some(self.id.clone()),
            field: self.field.clone(),
            kind,
            severity: Some(self.severity),
            message: Some(self.message.clone()),
            allow_missing: self.allow_missing,
        }
    }
}

/// An ordered, validated set of rules. Declaration order is evaluation order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Parse and compile a JSON rules document.
    pub fn load_str(json: &str) -> Result<Self, AppError> {
        let doc: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| AppError::config(format!("Malformed rules definition: {e}")))?;
        if let Some(rules) = doc.get("rules").and_then(|r| r.as_array()) {
            for (idx, rule) in rules.iter().enumerate() {
                check_keys(rule, idx)?;
            }
        }
        let file: RuleFile = serde_json::from_value(doc)
            .map_err(|e| AppError::config(format!("Malformed rules definition: {e}")))?;
        Self::from_defs(file.rules)
    }

    /// Read, parse and compile a JSON rules file.
    pub fn load_file(path: &Path) -> Result<Self, AppError> {
        let json = fs::read_to_string(path)
            .map_err(|e| AppError::io(format!("Failed to read rules file '{}': {e}", path.display())))?;
        Self::load_str(&json).map_err(|e| match e {
            AppError::Config(msg) => AppError::config(format!("{} ({msg})", path.display())),
            other => other,
        })
    }

    pub fn from_defs(defs: Vec<RuleDef>) -> Result<Self, AppError> {
        let mut rules = Vec::with_capacity(defs.len());
        let mut seen = HashSet::new();

        for (idx, def) in defs.into_iter().enumerate() {
            let rule = compile(def, idx)?;
            if !seen.insert(rule.id.clone()) {
                return Err(AppError::config(format!("Duplicate rule id `{}`.", rule.id)));
            }
            rules.push(rule);
        }

        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Serialize back to the rules file format (ids and messages made explicit).
    pub fn to_json(&self) -> Result<String, AppError> {
        let file = RuleFile {
            rules: self.rules.iter().map(Rule::to_def).collect(),
        };
        serde_json::to_string_pretty(&file)
            .map_err(|e| AppError::Internal(format!("Failed to serialize rules: {e}")))
    }
}

const COMMON_KEYS: [&str; 6] = ["id", "field", "kind", "severity", "message", "allow_missing"];

/// Parameters each kind accepts on top of the common keys.
fn kind_keys(kind: &str) -> Option<&'static [&'static str]> {
    let keys: &'static [&'static str] = match kind {
        "required" => &[],
        "range" => &["min", "max", "min_exclusive", "max_exclusive"],
        "pattern" => &["pattern"],
        "allowed_values" => &["values", "case_sensitive"],
        "cross_field" => &["reference", "relation"],
        _ => return None,
    };
    Some(keys)
}

/// `#[serde(flatten)]` cannot deny unknown fields, so a misspelt parameter
/// would otherwise load as a different rule.
fn check_keys(rule: &serde_json::Value, idx: usize) -> Result<(), AppError> {
    let Some(obj) = rule.as_object() else {
        return Ok(());
    };
    // Unknown or missing kinds are reported by serde.
    let Some(kind) = obj.get("kind").and_then(|k| k.as_str()) else {
        return Ok(());
    };
    let Some(allowed) = kind_keys(kind) else {
        return Ok(());
    };
    for key in obj.keys() {
        if !COMMON_KEYS.contains(&key.as_str()) && !allowed.contains(&key.as_str()) {
            return Err(AppError::config(format!(
                "Rule #{}: unknown key `{key}` for kind `{kind}`.",
                idx + 1
            )));
        }
    }
    Ok(())
}

fn compile(def: RuleDef, idx: usize) -> Result<Rule, AppError> {
    let field = def.field.trim().to_ascii_lowercase();
    if field.is_empty() {
        return Err(AppError::config(format!("Rule #{}: `field` must be non-empty.", idx + 1)));
    }

    let kind = match def.kind {
        RuleKindDef::Required => RuleKind::Required,
        RuleKindDef::Range {
            min,
            max,
            min_exclusive,
            max_exclusive,
        } => {
            if min.is_none() && max.is_none() {
                return Err(AppError::config(format!(
                    "Rule #{} (`{field}`): range needs `min` and/or `max`.",
                    idx + 1
                )));
            }
            if min.is_some_and(|v| !v.is_finite()) || max.is_some_and(|v| !v.is_finite()) {
                return Err(AppError::config(format!(
                    "Rule #{} (`{field}`): range bounds must be finite.",
                    idx + 1
                )));
            }
            if let (Some(lo), Some(hi)) = (min, max) {
                if lo > hi {
                    return Err(AppError::config(format!(
                        "Rule #{} (`{field}`): min {lo} is greater than max {hi}.",
                        idx + 1
                    )));
                }
            }
            RuleKind::Range(RangeBounds {
                min,
                max,
                min_exclusive,
                max_exclusive,
            })
        }
        RuleKindDef::Pattern { pattern } => {
            let re = Regex::new(&pattern).map_err(|e| {
                AppError::config(format!("Rule #{} (`{field}`): invalid pattern: {e}", idx + 1))
            })?;
            RuleKind::Pattern(re)
        }
        RuleKindDef::AllowedValues { values, case_sensitive } => {
            let values: Vec<String> = values.iter().map(|v| v.trim().to_string()).collect();
            if values.is_empty() || values.iter().any(String::is_empty) {
                return Err(AppError::config(format!(
                    "Rule #{} (`{field}`): `values` must be a non-empty list of non-empty strings.",
                    idx + 1
                )));
            }
            RuleKind::AllowedValues { values, case_sensitive }
        }
        RuleKindDef::CrossField { reference, relation } => {
            let reference = reference.trim().to_ascii_lowercase();
            if reference.is_empty() || reference == field {
                return Err(AppError::config(format!(
                    "Rule #{} (`{field}`): `reference` must name a different field.",
                    idx + 1
                )));
            }
            RuleKind::CrossField { reference, relation }
        }
    };

    let id = match def.id.map(|s| s.trim().to_string()) {
        Some(id) if !id.is_empty() => id,
        Some(_) => {
            return Err(AppError::config(format!("Rule #{}: `id` must be non-empty when given.", idx + 1)));
        }
        None => format!(
            "{}_{}_{:03}",
            field.to_ascii_uppercase(),
            kind.tag().to_ascii_uppercase(),
            idx + 1
        ),
    };

    let severity = def.severity.unwrap_or(match kind {
        RuleKind::Required | RuleKind::CrossField { .. } => Severity::High,
        _ => Severity::Med,
    });

    let message = def.message.unwrap_or_else(|| default_message(&field, &kind));

    Ok(Rule {
        id,
        field,
        kind,
        severity,
        message,
        allow_missing: def.allow_missing,
    })
}

fn default_message(field: &str, kind: &RuleKind) -> String {
    match kind {
        RuleKind::Required => format!("{field} is required and must be non-empty."),
        RuleKind::Range(b) => format!("{field} must be within {}.", b.describe()),
        RuleKind::Pattern(re) => format!("{field} must match pattern `{}`.", re.as_str()),
        RuleKind::AllowedValues { values, .. } => {
            format!("{field} must be one of: {}.", values.join(", "))
        }
        RuleKind::CrossField { reference, relation } => {
            let word = match relation {
                DateRelation::OnOrAfter => "on or after",
                DateRelation::OnOrBefore => "on or before",
            };
            format!("{field} must be {word} {reference}.")
        }
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_true(v: &bool) -> bool {
    *v
}

fn default_true() -> bool {
    true
}
