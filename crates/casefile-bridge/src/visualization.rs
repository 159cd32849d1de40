//! Defensive parser for the delimited sub-agent output format (spec §4.2
//! "Parsing of structured sub-agent output").
//!
//! The format is three labelled sections — a query, its raw results, and
//! an analysis — introduced by `QUERY:`, `RESULTS:`, and `ANALYSIS:`
//! markers on their own line. Any parse failure or missing section falls
//! back to a generic document visualisation carrying the raw text; this
//! function never returns an error.

const MARKERS: [&str; 3] = ["QUERY:", "RESULTS:", "ANALYSIS:"];

/// Parse `raw` into one of the recognised visualisation variants
/// (`graph`, `table`, `documents`), defaulting to `table` when a query
/// and results are both present but typing is ambiguous.
pub fn parse_subagent_output(raw: &str) -> serde_json::Value {
    match extract_sections(raw) {
        Some((query, results)) => classify(&query, &results),
        None => generic_document(raw),
    }
}

fn extract_sections(raw: &str) -> Option<(String, String)> {
    let query = extract_section(raw, "QUERY:")?;
    let results = extract_section(raw, "RESULTS:")?;
    Some((query, results))
}

fn extract_section(raw: &str, marker: &str) -> Option<String> {
    let start = raw.find(marker)? + marker.len();
    let rest = &raw[start..];
    let end = MARKERS
        .iter()
        .filter_map(|m| rest.find(m))
        .min()
        .unwrap_or(rest.len());
    let section = rest[..end].trim();
    if section.is_empty() {
        None
    } else {
        Some(section.to_owned())
    }
}

fn classify(query: &str, results: &str) -> serde_json::Value {
    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(results) {
        if let Some(obj) = parsed.as_object() {
            if let (Some(nodes), Some(edges)) = (obj.get("nodes"), obj.get("edges")) {
                return serde_json::json!({
                    "type": "graph",
                    "nodes": nodes,
                    "edges": edges,
                });
            }
        }
        if let Some(rows) = parsed.as_array() {
            if !rows.is_empty() && rows.iter().all(|r| r.is_object()) {
                return table_from_rows(rows);
            }
        }
    }

    // Ambiguous typing with a query present: tie-break to table (spec §4.2).
    serde_json::json!({
        "type": "table",
        "columns": ["query", "result"],
        "rows": [[query, results]],
    })
}

fn table_from_rows(rows: &[serde_json::Value]) -> serde_json::Value {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        if let Some(obj) = row.as_object() {
            for key in obj.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let table_rows: Vec<Vec<serde_json::Value>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| row.get(c).cloned().unwrap_or(serde_json::Value::Null))
                .collect()
        })
        .collect();

    serde_json::json!({ "type": "table", "columns": columns, "rows": table_rows })
}

fn generic_document(raw: &str) -> serde_json::Value {
    serde_json::json!({ "type": "documents", "items": [raw] })
}
