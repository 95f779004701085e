//! CDISC Dataset-JSON ingest.
//!
//! A Dataset-JSON document carries one or more datasets (item groups):
//!
//! ```text
//! {
//!   "creationDateTime": "...", "datasetJSONVersion": "1.1",
//!   "clinicalData": { "itemGroupData": {
//!     "IG.DM": { "name": "DM",
//!                "items": [ { "OID": "IT.USUBJID", "name": "USUBJID" }, ... ],
//!                "itemData": [ ["01-001", ...], ... ] } } }
//! }
//! ```
//!
//! One item group is flattened into the same `Dataset` the CSV reader
//! produces. Structural problems fail the load with `AppError::Dataset`.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::AppError;
use crate::io::ingest::{Dataset, RecordTable};

const REQUIRED_TOP_LEVEL: [&str; 2] = ["creationDateTime", "datasetJSONVersion"];

pub fn load_dataset_json(path: &Path, id_column: &str, item_group: Option<&str>) -> Result<Dataset, AppError> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to open Dataset-JSON '{}': {e}", path.display())))?;
    parse_dataset_json(&text, id_column, item_group).map_err(|e| match e {
        AppError::Dataset(msg) => AppError::dataset(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Parse a Dataset-JSON document and flatten one item group.
///
/// `item_group` matches an item group OID or dataset name, case-insensitively.
/// It may be omitted when the document holds exactly one item group.
pub fn parse_dataset_json(text: &str, id_column: &str, item_group: Option<&str>) -> Result<Dataset, AppError> {
    let doc: Value =
        serde_json::from_str(text).map_err(|e| AppError::dataset(format!("Malformed Dataset-JSON: {e}")))?;
    let doc = doc
        .as_object()
        .ok_or_else(|| AppError::dataset("Dataset-JSON must be a JSON object."))?;

    for key in REQUIRED_TOP_LEVEL {
        if !doc.contains_key(key) {
            return Err(AppError::dataset(format!("Missing required top-level attribute `{key}`.")));
        }
    }

    let root = doc
        .get("clinicalData")
        .or_else(|| doc.get("referenceData"))
        .ok_or_else(|| AppError::dataset("Dataset-JSON must include clinicalData or referenceData."))?
        .as_object()
        .ok_or_else(|| AppError::dataset("clinicalData/referenceData must be a JSON object."))?;

    let groups = root
        .get("itemGroupData")
        .ok_or_else(|| AppError::dataset("Missing itemGroupData under clinicalData/referenceData."))?
        .as_object()
        .ok_or_else(|| AppError::dataset("itemGroupData must be an object mapping OIDs to datasets."))?;

    let (oid, group) = select_item_group(groups, item_group)?;
    let group = group
        .as_object()
        .ok_or_else(|| AppError::dataset(format!("Item group `{oid}` must be a JSON object.")))?;

    let columns = column_names(oid, group)?;
    let rows = group
        .get("itemData")
        .and_then(Value::as_array)
        .ok_or_else(|| AppError::dataset(format!("`{oid}.itemData` must be an array of records.")))?;

    let mut table = RecordTable::new(&columns, id_column, "row")?;
    for (idx, row) in rows.iter().enumerate() {
        let row_no = idx + 1;
        let values = row
            .as_array()
            .ok_or_else(|| AppError::dataset(format!("`{oid}.itemData` row {row_no} must be an array.")))?;
        if values.len() > table.width() {
            return Err(AppError::dataset(format!(
                "`{oid}.itemData` row {row_no} has {} values for {} items.",
                values.len(),
                table.width()
            )));
        }
        if values.len() < table.width() {
            tracing::warn!(item_group = %oid, row = row_no, "short itemData row; trailing items are absent");
        }

        let cells = values
            .iter()
            .enumerate()
            .map(|(col, v)| cell_text(v).ok_or_else(|| {
                AppError::dataset(format!("`{oid}.itemData` row {row_no}, item {}: nested values are not supported.", col + 1))
            }))
            .collect::<Result<Vec<String>, AppError>>()?;
        table.push_row(row_no, cells.iter().map(String::as_str))?;
    }

    tracing::debug!(item_group = %oid, rows = rows.len(), "Dataset-JSON item group flattened");
    Ok(table.finish())
}

fn select_item_group<'a>(
    groups: &'a Map<String, Value>,
    wanted: Option<&str>,
) -> Result<(&'a str, &'a Value), AppError> {
    let available = || groups.keys().cloned().collect::<Vec<_>>().join(", ");

    let Some(wanted) = wanted else {
        let mut iter = groups.iter();
        return match (iter.next(), iter.next()) {
            (Some((oid, group)), None) => Ok((oid.as_str(), group)),
            (None, _) => Err(AppError::dataset("itemGroupData holds no item groups.")),
            _ => Err(AppError::dataset(format!(
                "Several item groups present ({}); choose one with --item-group.",
                available()
            ))),
        };
    };

    let by_oid = groups.iter().find(|(oid, _)| oid.eq_ignore_ascii_case(wanted));
    let by_name = || {
        groups.iter().find(|(_, group)| {
            group
                .get("name")
                .and_then(Value::as_str)
                .is_some_and(|name| name.eq_ignore_ascii_case(wanted))
        })
    };
    let by_suffix = || {
        let suffix = format!(".{}", wanted.to_ascii_uppercase());
        groups.iter().find(|(oid, _)| oid.to_ascii_uppercase().ends_with(&suffix))
    };

    by_oid
        .or_else(by_name)
        .or_else(by_suffix)
        .map(|(oid, group)| (oid.as_str(), group))
        .ok_or_else(|| AppError::dataset(format!("Item group `{wanted}` not found (available: {}).", available())))
}

/// Column names come from each item's `name`, falling back to its `OID`.
fn column_names(oid: &str, group: &Map<String, Value>) -> Result<Vec<String>, AppError> {
    let items = group
        .get("items")
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
        .ok_or_else(|| AppError::dataset(format!("`{oid}.items` must be a non-empty array.")))?;

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let item = item
                .as_object()
                .ok_or_else(|| AppError::dataset(format!("`{oid}.items[{idx}]` must be an object.")))?;
            item.get("name")
                .or_else(|| item.get("OID"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| AppError::dataset(format!("`{oid}.items[{idx}]` has no name or OID.")))
        })
        .collect()
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Scalar;

    fn doc(groups: &str) -> String {
        format!(
            r#"{{ "creationDateTime": "2026-01-22T00:00:00", "datasetJSONVersion": "1.1",
                 "clinicalData": {{ "itemGroupData": {{ {groups} }} }} }}"#
        )
    }

    const DM: &str = r#""IG.DM": {
        "name": "DM",
        "items": [ { "OID": "IT.USUBJID", "name": "USUBJID" }, { "OID": "IT.AGE" }, { "name": "SEX" } ],
        "itemData": [ ["01-001", 34, "F"], ["01-002", null, "M"] ]
    }"#;

    const VS: &str = r#""IG.VS": {
        "name": "VS",
        "items": [ { "name": "USUBJID" }, { "name": "VSTESTCD" } ],
        "itemData": [ ["01-001", "SYSBP"] ]
    }"#;

    #[test]
    fn flattens_single_item_group() {
        let ds = parse_dataset_json(&doc(DM), "usubjid", None).unwrap();
        assert_eq!(ds.columns, vec!["usubjid", "it.age", "sex"]);
        assert_eq!(ds.records.len(), 2);

        let first = &ds.records[0];
        assert_eq!(first.id.as_str(), "01-001");
        assert_eq!(first.line, 1);
        assert_eq!(first.get("it.age").unwrap().value, Scalar::Number(34.0));
        assert!(ds.records[1].get("it.age").is_none());
    }

    #[test]
    fn missing_top_level_attributes_are_errors() {
        let err = parse_dataset_json(r#"{ "clinicalData": { "itemGroupData": {} } }"#, "usubjid", None).unwrap_err();
        assert!(matches!(err, AppError::Dataset(msg) if msg.contains("creationDateTime")));
    }

    #[test]
    fn root_must_be_an_object() {
        let text = r#"{ "creationDateTime": "x", "datasetJSONVersion": "1.1", "clinicalData": [] }"#;
        assert!(matches!(parse_dataset_json(text, "usubjid", None), Err(AppError::Dataset(_))));

        let text = r#"{ "creationDateTime": "x", "datasetJSONVersion": "1.1", "referenceData": { "itemGroupData": [] } }"#;
        assert!(matches!(parse_dataset_json(text, "usubjid", None), Err(AppError::Dataset(_))));
    }

    #[test]
    fn selects_item_group_by_oid_or_name() {
        let text = doc(&format!("{DM}, {VS}"));
        let err = parse_dataset_json(&text, "usubjid", None).unwrap_err();
        assert!(matches!(err, AppError::Dataset(msg) if msg.contains("IG.DM") && msg.contains("IG.VS")));

        let vs = parse_dataset_json(&text, "usubjid", Some("vs")).unwrap();
        assert_eq!(vs.columns, vec!["usubjid", "vstestcd"]);
        let dm = parse_dataset_json(&text, "usubjid", Some("IG.DM")).unwrap();
        assert_eq!(dm.records.len(), 2);
        assert!(parse_dataset_json(&text, "usubjid", Some("AE")).is_err());
    }

    #[test]
    fn name_lookup_does_not_depend_on_oid() {
        let text = doc(r#""IG.SOMETHING": { "name": "DM", "items": [ { "name": "USUBJID" } ], "itemData": [ ["01-001"] ] }"#);
        let ds = parse_dataset_json(&text, "usubjid", Some("DM")).unwrap();
        assert_eq!(ds.records.len(), 1);
    }

    #[test]
    fn short_rows_pad_and_long_rows_fail() {
        let short = doc(r#""IG.VS": { "items": [ { "name": "USUBJID" }, { "name": "VSTESTCD" } ], "itemData": [ ["01-001"] ] }"#);
        let ds = parse_dataset_json(&short, "usubjid", None).unwrap();
        assert!(ds.records[0].get("vstestcd").is_none());

        let long = doc(r#""IG.VS": { "items": [ { "name": "USUBJID" } ], "itemData": [ ["01-001", "extra"] ] }"#);
        let err = parse_dataset_json(&long, "usubjid", None).unwrap_err();
        assert!(matches!(err, AppError::Dataset(msg) if msg.contains("row 1")));
    }

    #[test]
    fn malformed_items_and_rows_are_errors() {
        let no_items = doc(r#""IG.X": { "items": [], "itemData": [] }"#);
        assert!(parse_dataset_json(&no_items, "usubjid", None).is_err());

        let object_row = doc(r#""IG.X": { "items": [ { "name": "USUBJID" } ], "itemData": [ { "USUBJID": "1" } ] }"#);
        assert!(parse_dataset_json(&object_row, "usubjid", None).is_err());

        let nested = doc(r#""IG.X": { "items": [ { "name": "USUBJID" } ], "itemData": [ [ ["1"] ] ] }"#);
        assert!(parse_dataset_json(&nested, "usubjid", None).is_err());
    }

    #[test]
    fn duplicate_ids_name_the_row() {
        let text = doc(r#""IG.DM": { "items": [ { "name": "USUBJID" } ], "itemData": [ ["1"], ["2"], ["1"] ] }"#);
        let err = parse_dataset_json(&text, "usubjid", None).unwrap_err();
        assert!(matches!(err, AppError::Dataset(msg) if msg.contains("row 3")));
    }
}
