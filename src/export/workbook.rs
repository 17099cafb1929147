//! Single-sheet workbook serialization.

use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde_json::{Map, Value};

/// Longest string a single cell holds.
const MAX_CELL_CHARS: usize = 32_767;

/// Header row: the union of all row keys, in first-seen order.
#[must_use]
pub fn header_columns(rows: &[Map<String, Value>]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

/// Serializes `rows` into an xlsx workbook with one sheet.
///
/// `sheet_name` must already be sanitized.
pub fn build_workbook(rows: &[Map<String, Value>], sheet_name: &str) -> Result<Vec<u8>, XlsxError> {
    let columns = header_columns(rows);
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(sheet_name)?;

    let bold = Format::new().set_bold();
    for (col, name) in columns.iter().enumerate() {
        sheet.write_string_with_format(0, col_index(col)?, name, &bold)?;
    }

    for (r, row) in rows.iter().enumerate() {
        let row_num = row_index(r + 1)?;
        for (col, name) in columns.iter().enumerate() {
            if let Some(value) = row.get(name) {
                write_value(sheet, row_num, col_index(col)?, value)?;
            }
        }
    }

    workbook.save_to_buffer()
}

fn write_value(sheet: &mut Worksheet, row: u32, col: u16, value: &Value) -> Result<(), XlsxError> {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.is_finite() => {
                sheet.write_number(row, col, f)?;
            }
            _ => {
                sheet.write_string(row, col, n.to_string())?;
            }
        },
        Value::String(s) => {
            sheet.write_string(row, col, clip(s))?;
        }
        nested @ (Value::Array(_) | Value::Object(_)) => {
            sheet.write_string(row, col, clip(&nested.to_string()))?;
        }
    }
    Ok(())
}

fn clip(s: &str) -> &str {
    match s.char_indices().nth(MAX_CELL_CHARS) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn row_index(n: usize) -> Result<u32, XlsxError> {
    u32::try_from(n).map_err(|_| XlsxError::RowColumnLimitError)
}

fn col_index(n: usize) -> Result<u16, XlsxError> {
    u16::try_from(n).map_err(|_| XlsxError::RowColumnLimitError)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: Value) -> Vec<Map<String, Value>> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => map,
                    other => panic!("not an object: {other}"),
                })
                .collect(),
            other => panic!("not an array: {other}"),
        }
    }

    #[test]
    fn test_header_is_union_in_first_seen_order() {
        let data = rows(json!([
            {"status": "shipped", "count": 3},
            {"region": "EU", "status": "pending"},
        ]));
        let header = header_columns(&data);
        assert_eq!(header.len(), 3);
        assert!(header.contains(&"region".to_string()));
        assert_eq!(header.last().map(String::as_str), Some("region"));
    }

    #[test]
    fn test_build_workbook_produces_zip() {
        let data = rows(json!([
            {"status": "shipped", "count": 3, "ok": true, "meta": {"a": 1}},
            {"status": null, "count": 1.5},
        ]));
        let bytes =
            build_workbook(&data, "Report").unwrap_or_else(|e| panic!("build failed: {e}"));
        // xlsx is a zip container.
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_clip_respects_char_boundaries() {
        let long = "é".repeat(MAX_CELL_CHARS + 10);
        assert_eq!(clip(&long).chars().count(), MAX_CELL_CHARS);
        assert_eq!(clip("short"), "short");
    }
}
