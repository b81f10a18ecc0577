/// JSON and CSV serialisation for export endpoints
///
/// Records are first converted to `serde_json::Value` so both formats see the
/// same field names and order (struct declaration order).
///
/// # CSV rules
///
/// - header row from the first record's keys
/// - `null` → empty cell
/// - strings wrapped in quotes, embedded quotes doubled
/// - objects and arrays JSON-encoded, then quoted like strings
/// - numbers and booleans written bare
/// - rows joined by `\n`; an empty record set yields an empty string

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Export output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

/// Renders records in the requested format
pub fn render(records: &[JsonValue], format: ExportFormat) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(records),
        ExportFormat::Csv => Ok(to_csv(records)),
    }
}

/// Renders records as CSV
pub fn to_csv(records: &[JsonValue]) -> String {
    let Some(JsonValue::Object(first)) = records.first() else {
        return String::new();
    };

    let headers: Vec<&String> = first.keys().collect();
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(
        headers
            .iter()
            .map(|h| h.as_str())
            .collect::<Vec<_>>()
            .join(","),
    );

    for record in records {
        let cells: Vec<String> = headers
            .iter()
            .map(|header| cell(record.get(header.as_str())))
            .collect();
        lines.push(cells.join(","));
    }

    lines.join("\n")
}

fn cell(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => quote(s),
        Some(JsonValue::Bool(b)) => b.to_string(),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(nested @ (JsonValue::Object(_) | JsonValue::Array(_))) => quote(&nested.to_string()),
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_records_yield_empty_string() {
        assert_eq!(to_csv(&[]), "");
        assert_eq!(render(&[], ExportFormat::Csv).unwrap(), "");
    }

    #[test]
    fn test_header_matches_first_record_keys() {
        let records = vec![json!({"id": 1, "title": "Walk", "done": false})];
        let csv = to_csv(&records);
        let header = csv.lines().next().unwrap();

        assert_eq!(header, "id,title,done");
        assert_eq!(header.split(',').count(), 3);
    }

    #[test]
    fn test_quotes_are_doubled() {
        let records = vec![json!({"title": "Say \"hi\" twice"})];
        let csv = to_csv(&records);

        assert_eq!(csv, "title\n\"Say \"\"hi\"\" twice\"");
    }

    #[test]
    fn test_nested_values_are_json_encoded() {
        let records = vec![json!({
            "user": {"name": "Ann"},
            "tags": ["a", "b"],
            "note": null,
            "score": 0.5
        })];
        let csv = to_csv(&records);
        let row = csv.lines().nth(1).unwrap();

        assert_eq!(row, "\"{\"\"name\"\":\"\"Ann\"\"}\",\"[\"\"a\"\",\"\"b\"\"]\",,0.5");
    }

    #[test]
    fn test_missing_keys_in_later_rows_are_empty() {
        let records = vec![json!({"a": 1, "b": 2}), json!({"a": 3})];
        assert_eq!(to_csv(&records), "a,b\n1,2\n3,");
    }

    #[test]
    fn test_json_is_pretty_printed() {
        let records = vec![json!({"a": 1})];
        let out = render(&records, ExportFormat::Json).unwrap();
        assert_eq!(out, "[\n  {\n    \"a\": 1\n  }\n]");
    }

    #[test]
    fn test_format_metadata() {
        assert_eq!(ExportFormat::Csv.extension(), "csv");
        assert_eq!(ExportFormat::Json.content_type(), "application/json");
        assert_eq!(ExportFormat::default(), ExportFormat::Json);
    }
}
