//! CSV export of the current filtered rows.

use crate::dataset::Row;
use crate::value::display_string;
use serde_json::Value;

/// Render rows as CSV. The header is the column list; a field is wrapped in
/// double quotes (with internal quotes doubled) if and only if it contains
/// a comma, a newline or a double quote. Null/absent cells export as empty
/// fields.
pub fn export_csv(columns: &[String], rows: &[Row]) -> String {
    let mut out = String::new();

    let header: Vec<String> = columns.iter().map(|c| escape_field(c)).collect();
    out.push_str(&header.join(","));
    out.push('\n');

    for row in rows {
        let fields: Vec<String> = columns
            .iter()
            .map(|column| {
                let cell = row.get(column).unwrap_or(&Value::Null);
                escape_field(&display_string(cell).unwrap_or_default())
            })
            .collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }

    out
}

fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('\n') || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
