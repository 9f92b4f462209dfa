//! Lenient decision parser
//!
//! Turns whatever the primary source produced into a structurally complete
//! [`RoutingDecision`]. It never fails: unusable fields fall back to defaults
//! and every substitution is recorded as a diagnostic. Value ranges are left
//! alone so the validator can still reject them.

use super::schema::{MemoryRequirement, ResponseMode, Route, RoutingDecision};
use super::source::DecisionPayload;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```")
        .expect("FENCED_JSON is a compile-time constant")
});

static SINGLE_QUOTED_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'([^'\\]*)'\s*:").expect("SINGLE_QUOTED_KEY is a compile-time constant")
});

static SINGLE_QUOTED_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":\s*'([^'\\]*)'").expect("SINGLE_QUOTED_VALUE is a compile-time constant")
});

static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r",\s*([}\]])").expect("TRAILING_COMMA is a compile-time constant")
});

/// Upper bound on how many trailing members a truncated payload may lose
const MAX_TRUNCATION_CUTS: usize = 16;

/// Parser output
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDecision {
    /// Structurally complete candidate, not yet validated
    pub decision: RoutingDecision,
    /// At least one field was defaulted or coerced
    pub degraded: bool,
    /// What was defaulted or coerced, in order
    pub diagnostics: Vec<String>,
}

/// Where the JSON object was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extraction {
    Direct,
    Fenced,
    Embedded,
    Repaired,
    Truncated,
}

/// Parse a raw payload into a candidate decision
pub fn parse(payload: &DecisionPayload) -> ParsedDecision {
    let mut notes = Vec::new();

    let object = match payload {
        DecisionPayload::Structured(Value::Object(map)) => Some(map.clone()),
        DecisionPayload::Structured(Value::String(text)) => {
            notes.push("structured payload was a JSON string".to_string());
            extract_object(text, &mut notes)
        }
        DecisionPayload::Structured(_) => {
            notes.push("structured payload is not an object".to_string());
            None
        }
        DecisionPayload::Text(text) => extract_object(text, &mut notes),
    };

    let decision = match object {
        Some(map) => decision_from_map(&lowercase_keys(map), &mut notes),
        None => {
            notes.push("no JSON object found; every field defaulted".to_string());
            RoutingDecision::new(Route::None, 0.0)
        }
    };

    for note in &notes {
        debug!(diagnostic = %note, "Lenient parser");
    }

    ParsedDecision {
        decision,
        degraded: !notes.is_empty(),
        diagnostics: notes,
    }
}

fn extract_object(text: &str, notes: &mut Vec<String>) -> Option<Map<String, Value>> {
    let (map, how) = extract_json(text)?;
    match how {
        Extraction::Repaired => notes.push("payload needed JSON repair".to_string()),
        Extraction::Truncated => notes.push("payload was truncated; closed it".to_string()),
        Extraction::Direct | Extraction::Fenced | Extraction::Embedded => {}
    }
    Some(map)
}

/// Find a JSON object in `text`, trying progressively more invasive strategies
fn extract_json(text: &str) -> Option<(Map<String, Value>, Extraction)> {
    let trimmed = text.trim();

    if let Some(map) = parse_object(trimmed) {
        return Some((map, Extraction::Direct));
    }

    if let Some(map) = FENCED_JSON
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_object(m.as_str()))
    {
        return Some((map, Extraction::Fenced));
    }

    if let Some(map) = top_level_objects(trimmed)
        .into_iter()
        .rev()
        .find_map(parse_object)
    {
        return Some((map, Extraction::Embedded));
    }

    let start = trimmed.find('{')?;
    let tail = &trimmed[start..];

    if let Some(end) = tail.rfind('}') {
        if let Some(map) = parse_object(&repair(&tail[..=end])) {
            return Some((map, Extraction::Repaired));
        }
    }

    close_truncated(&repair(tail)).map(|map| (map, Extraction::Truncated))
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Fix the defects models commonly emit
fn repair(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect();
    let cleaned = SINGLE_QUOTED_KEY.replace_all(&cleaned, "\"$1\":");
    let cleaned = SINGLE_QUOTED_VALUE.replace_all(&cleaned, ": \"$1\"");
    TRAILING_COMMA.replace_all(&cleaned, "$1").into_owned()
}

/// Lexical state at the end of a JSON prefix
struct Scan {
    closers: Vec<char>,
    in_string: bool,
    escaped: bool,
    last_comma: Option<usize>,
}

fn scan(text: &str) -> Scan {
    let mut state = Scan {
        closers: Vec::new(),
        in_string: false,
        escaped: false,
        last_comma: None,
    };

    for (i, c) in text.char_indices() {
        if state.in_string {
            match c {
                _ if state.escaped => state.escaped = false,
                '\\' => state.escaped = true,
                '"' => state.in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => state.in_string = true,
            '{' => state.closers.push('}'),
            '[' => state.closers.push(']'),
            '}' | ']' => {
                state.closers.pop();
            }
            ',' => state.last_comma = Some(i),
            _ => {}
        }
    }

    state
}

/// Close a payload cut off mid-stream
///
/// Closes an open string and every open bracket. When the result still does
/// not parse (dangling key, half a literal), the last member is dropped and
/// the closing is retried.
fn close_truncated(text: &str) -> Option<Map<String, Value>> {
    let mut end = text.len();

    for _ in 0..MAX_TRUNCATION_CUTS {
        let prefix = &text[..end];
        let state = scan(prefix);

        let mut candidate = if state.in_string {
            let mut open = prefix.to_string();
            if state.escaped {
                open.pop();
            }
            open.push('"');
            open
        } else {
            prefix.trim_end().to_string()
        };

        while candidate.ends_with(',') {
            candidate.pop();
            candidate.truncate(candidate.trim_end().len());
        }
        candidate.extend(state.closers.iter().rev());

        if let Some(map) = parse_object(&TRAILING_COMMA.replace_all(&candidate, "$1")) {
            return Some(map);
        }

        end = state.last_comma?;
    }

    None
}

/// Source slices of every balanced `{...}` that is not nested in another
fn top_level_objects(text: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' | '[' => {
                if depth == 0 && c == '{' {
                    start = Some(i);
                }
                if depth > 0 || c == '{' {
                    depth += 1;
                }
            }
            '}' | ']' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        found.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    found
}

fn lowercase_keys(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v))
        .collect()
}

/// Lowercase, trim, and unify separators of an enum name
fn normalize_name(raw: &str) -> String {
    raw.trim().to_lowercase().replace(['-', ' '], "_")
}

fn present<'a>(map: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    map.get(field).filter(|v| !v.is_null())
}

fn decision_from_map(map: &Map<String, Value>, notes: &mut Vec<String>) -> RoutingDecision {
    let (route, legacy_flags) = read_route(map, notes);

    // Absent flags follow the legacy mapping, else the route itself (one-hot)
    let (static_default, sql_default) =
        legacy_flags.unwrap_or((route == Route::StaticRag, route == Route::SqlRag));
    let needs_static_rag = read_flag(map, "needs_static_rag", static_default, notes);
    let needs_sql_rag = read_flag(map, "needs_sql_rag", sql_default, notes);
    let needs_report = read_flag(map, "needs_report", route == Route::Report, notes);

    let response_mode = match present(map, "response_mode") {
        Some(Value::String(s)) => ResponseMode::from_name(&normalize_name(s)).unwrap_or_else(|| {
            notes.push(format!("unknown response_mode `{s}`; defaulted to direct"));
            ResponseMode::Direct
        }),
        Some(other) => {
            notes.push(format!("response_mode is {other}; defaulted to direct"));
            ResponseMode::Direct
        }
        None => {
            notes.push("response_mode missing; defaulted to direct".to_string());
            ResponseMode::Direct
        }
    };

    let memory_requirement = match present(map, "memory_requirement") {
        Some(Value::String(s)) => MemoryRequirement::from_name(&normalize_name(s))
            .unwrap_or_else(|| {
                notes.push(format!("unknown memory_requirement `{s}`; defaulted to none"));
                MemoryRequirement::None
            }),
        Some(other) => {
            notes.push(format!("memory_requirement is {other}; defaulted to none"));
            MemoryRequirement::None
        }
        None => MemoryRequirement::None,
    };

    RoutingDecision {
        route,
        needs_static_rag,
        needs_sql_rag,
        needs_report,
        static_rag_query: read_string(map, "static_rag_query", notes),
        sql_intent: read_string(map, "sql_intent", notes),
        response_mode,
        confidence: read_confidence(map, notes),
        reasoning: read_string(map, "reasoning", notes).unwrap_or_default(),
        memory_requirement,
        follow_up_needed: read_bool(map, "follow_up_needed", notes).unwrap_or(false),
        context_to_preserve: read_string_list(map, "context_to_preserve", notes),
    }
}

/// Route plus the need-flags implied by a legacy `rag_type`
fn read_route(map: &Map<String, Value>, notes: &mut Vec<String>) -> (Route, Option<(bool, bool)>) {
    match present(map, "route") {
        Some(Value::String(s)) => {
            let name = normalize_name(s);
            let route = Route::from_name(&name).or(match name.as_str() {
                "static" | "rag" | "document" | "documents" => Some(Route::StaticRag),
                "sql" | "database" | "db" => Some(Route::SqlRag),
                "follow_up" => Some(Route::Followup),
                _ => None,
            });
            match route {
                Some(route) => {
                    if route.as_str() != s.as_str() {
                        notes.push(format!("route `{s}` read as {route}"));
                    }
                    (route, None)
                }
                None => {
                    notes.push(format!("unknown route `{s}`; defaulted to none"));
                    (Route::None, None)
                }
            }
        }
        Some(other) => {
            notes.push(format!("route is {other}; defaulted to none"));
            (Route::None, None)
        }
        None => match present(map, "rag_type").and_then(Value::as_str) {
            Some(legacy) => {
                let mapped = match normalize_name(legacy).as_str() {
                    "static" => Some((Route::StaticRag, (true, false))),
                    "sql" => Some((Route::SqlRag, (false, true))),
                    "both" => Some((Route::SqlRag, (true, true))),
                    "none" => Some((Route::Chat, (false, false))),
                    _ => None,
                };
                match mapped {
                    Some((route, flags)) => {
                        notes.push(format!("legacy rag_type `{legacy}` read as {route}"));
                        (route, Some(flags))
                    }
                    None => {
                        notes.push(format!("unknown rag_type `{legacy}`; defaulted to none"));
                        (Route::None, None)
                    }
                }
            }
            None => {
                notes.push("route missing; defaulted to none".to_string());
                (Route::None, None)
            }
        },
    }
}

fn read_flag(
    map: &Map<String, Value>,
    field: &str,
    default: bool,
    notes: &mut Vec<String>,
) -> bool {
    if let Some(value) = read_bool(map, field, notes) {
        return value;
    }
    notes.push(format!("{field} missing; defaulted to {default}"));
    default
}

fn read_bool(map: &Map<String, Value>, field: &str, notes: &mut Vec<String>) -> Option<bool> {
    let value = present(map, field)?;
    let parsed = match value {
        Value::Bool(b) => return Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 0.0 => Some(false),
            Some(x) if x == 1.0 => Some(true),
            _ => None,
        },
        _ => None,
    };
    match parsed {
        Some(b) => notes.push(format!("{field} coerced from {value} to {b}")),
        None => notes.push(format!("{field} is {value}; not a boolean")),
    }
    parsed
}

fn read_string(map: &Map<String, Value>, field: &str, notes: &mut Vec<String>) -> Option<String> {
    match present(map, field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            notes.push(format!("{field} coerced from number"));
            Some(n.to_string())
        }
        Value::Bool(b) => {
            notes.push(format!("{field} coerced from boolean"));
            Some(b.to_string())
        }
        other => {
            notes.push(format!("{field} is {other}; dropped"));
            None
        }
    }
}

fn read_string_list(map: &Map<String, Value>, field: &str, notes: &mut Vec<String>) -> Vec<String> {
    match present(map, field) {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => {
                    notes.push(format!("{field} entry {other} coerced to string"));
                    Some(other.to_string())
                }
            })
            .collect(),
        Some(Value::String(s)) => {
            notes.push(format!("{field} was a single string"));
            vec![s.clone()]
        }
        Some(other) => {
            notes.push(format!("{field} is {other}; dropped"));
            Vec::new()
        }
    }
}

fn read_confidence(map: &Map<String, Value>, notes: &mut Vec<String>) -> f64 {
    let value = match present(map, "confidence") {
        Some(value) => value,
        None => {
            notes.push("confidence missing; defaulted to 0.0".to_string());
            return 0.0;
        }
    };

    match value {
        Value::Number(n) => n.as_f64().unwrap_or_else(|| {
            notes.push(format!("confidence {n} is not representable; defaulted to 0.0"));
            0.0
        }),
        Value::String(s) => {
            let text = s.trim().to_lowercase();
            let parsed = match text.as_str() {
                "high" => Some(0.9),
                "medium" => Some(0.6),
                "low" => Some(0.3),
                _ => match text.strip_suffix('%') {
                    Some(pct) => pct.trim().parse::<f64>().ok().map(|p| p / 100.0),
                    None => text.parse::<f64>().ok(),
                },
            };
            match parsed {
                Some(c) => {
                    notes.push(format!("confidence `{s}` read as {c}"));
                    c
                }
                None => {
                    notes.push(format!("confidence `{s}` unparsable; defaulted to 0.0"));
                    0.0
                }
            }
        }
        other => {
            notes.push(format!("confidence is {other}; defaulted to 0.0"));
            0.0
        }
    }
}

#[cfg(test)]
mod tests;
