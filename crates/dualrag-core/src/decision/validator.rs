//! Decision validator
//!
//! A hard gate: a candidate either satisfies every structural and semantic
//! rule or is rejected with the offending field. Nothing is coerced here.

use super::schema::{MemoryRequirement, ResponseMode, Route, RoutingDecision};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

/// A rule violation in a routing decision
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid `{field}`: {cause}")]
pub struct ValidationError {
    /// Offending field (`$` for the payload as a whole)
    pub field: String,
    /// Human-readable cause
    pub cause: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            cause: cause.into(),
        }
    }
}

type Result<T> = std::result::Result<T, ValidationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    String,
    Bool,
    Number,
    StringList,
}

impl Kind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Bool => value.is_boolean(),
            Self::Number => value.is_number(),
            Self::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Bool => "a boolean",
            Self::Number => "a number",
            Self::StringList => "an array of strings",
        }
    }
}

const REQUIRED: [(&str, Kind); 6] = [
    ("route", Kind::String),
    ("needs_static_rag", Kind::Bool),
    ("needs_sql_rag", Kind::Bool),
    ("needs_report", Kind::Bool),
    ("response_mode", Kind::String),
    ("confidence", Kind::Number),
];

const OPTIONAL: [(&str, Kind); 6] = [
    ("static_rag_query", Kind::String),
    ("sql_intent", Kind::String),
    ("reasoning", Kind::String),
    ("memory_requirement", Kind::String),
    ("follow_up_needed", Kind::Bool),
    ("context_to_preserve", Kind::StringList),
];

/// Validate an untyped payload and build the decision it describes
///
/// Checks run in order: required fields and primitive types, confidence range,
/// enum membership, then the cross-field rules of [`validate_decision`].
pub fn validate(raw: &Value) -> Result<RoutingDecision> {
    let obj = raw
        .as_object()
        .ok_or_else(|| ValidationError::new("$", "expected a JSON object"))?;

    check_types(obj)?;

    // Lookups below rely on check_types having passed
    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| ValidationError::new("confidence", "missing"))?;
    check_confidence(confidence)?;

    let route = enum_field(obj, "route", Route::from_name)?;
    let response_mode = enum_field(obj, "response_mode", ResponseMode::from_name)?;
    let memory_requirement = match non_null(obj, "memory_requirement") {
        Some(_) => enum_field(obj, "memory_requirement", MemoryRequirement::from_name)?,
        None => MemoryRequirement::None,
    };

    let decision = RoutingDecision {
        route,
        needs_static_rag: bool_field(obj, "needs_static_rag"),
        needs_sql_rag: bool_field(obj, "needs_sql_rag"),
        needs_report: bool_field(obj, "needs_report"),
        static_rag_query: string_field(obj, "static_rag_query"),
        sql_intent: string_field(obj, "sql_intent"),
        response_mode,
        confidence,
        reasoning: string_field(obj, "reasoning").unwrap_or_default(),
        memory_requirement,
        follow_up_needed: bool_field(obj, "follow_up_needed"),
        context_to_preserve: non_null(obj, "context_to_preserve")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    };

    validate_decision(&decision)?;
    Ok(decision)
}

/// Cross-field and range rules for an already-typed decision
pub fn validate_decision(decision: &RoutingDecision) -> Result<()> {
    check_confidence(decision.confidence)?;

    if decision.route == Route::None && decision.has_need_flag() {
        let field = if decision.needs_static_rag {
            "needs_static_rag"
        } else if decision.needs_sql_rag {
            "needs_sql_rag"
        } else {
            "needs_report"
        };
        return Err(ValidationError::new(
            field,
            "route `none` forbids every need-flag",
        ));
    }

    match decision.route {
        Route::StaticRag if is_blank(decision.static_rag_query.as_deref()) => {
            return Err(ValidationError::new(
                "static_rag_query",
                "required when route is static_rag",
            ))
        }
        Route::SqlRag if is_blank(decision.sql_intent.as_deref()) => {
            return Err(ValidationError::new(
                "sql_intent",
                "required when route is sql_rag",
            ))
        }
        _ => {}
    }

    if decision.needs_static_rag && is_blank(decision.static_rag_query.as_deref()) {
        return Err(ValidationError::new(
            "static_rag_query",
            "required when needs_static_rag is true",
        ));
    }

    if decision.needs_sql_rag && is_blank(decision.sql_intent.as_deref()) {
        return Err(ValidationError::new(
            "sql_intent",
            "required when needs_sql_rag is true",
        ));
    }

    if decision.follow_up_needed && decision.memory_requirement == MemoryRequirement::None {
        info!(
            route = %decision.route,
            "follow_up_needed with memory_requirement none; nothing will be preserved"
        );
    }

    debug!(route = %decision.route, confidence = decision.confidence, "Decision valid");
    Ok(())
}

fn check_types(obj: &Map<String, Value>) -> Result<()> {
    for (field, kind) in REQUIRED {
        match obj.get(field) {
            None | Some(Value::Null) => {
                return Err(ValidationError::new(field, "required field is missing"))
            }
            Some(value) if !kind.matches(value) => {
                return Err(ValidationError::new(
                    field,
                    format!("expected {}", kind.name()),
                ))
            }
            Some(_) => {}
        }
    }

    for (field, kind) in OPTIONAL {
        if let Some(value) = non_null(obj, field) {
            if !kind.matches(value) {
                return Err(ValidationError::new(
                    field,
                    format!("expected {} or null", kind.name()),
                ));
            }
        }
    }

    Ok(())
}

fn check_confidence(confidence: f64) -> Result<()> {
    if !confidence.is_finite() {
        return Err(ValidationError::new("confidence", "must be a finite number"));
    }
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ValidationError::new(
            "confidence",
            format!("{confidence} is outside [0, 1]"),
        ));
    }
    Ok(())
}

fn non_null<'a>(obj: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    obj.get(field).filter(|v| !v.is_null())
}

fn enum_field<T>(
    obj: &Map<String, Value>,
    field: &str,
    lookup: impl Fn(&str) -> Option<T>,
) -> Result<T> {
    let name = obj.get(field).and_then(Value::as_str).unwrap_or_default();
    lookup(name).ok_or_else(|| ValidationError::new(field, format!("unknown variant `{name}`")))
}

fn bool_field(obj: &Map<String, Value>, field: &str) -> bool {
    obj.get(field).and_then(Value::as_bool).unwrap_or(false)
}

fn string_field(obj: &Map<String, Value>, field: &str) -> Option<String> {
    obj.get(field).and_then(Value::as_str).map(str::to_string)
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |s| s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Value {
        json!({
            "route": "static_rag",
            "needs_static_rag": true,
            "needs_sql_rag": false,
            "needs_report": false,
            "static_rag_query": "chapter 3 summary",
            "response_mode": "search_then_answer",
            "confidence": 0.9
        })
    }

    fn with(mut value: Value, field: &str, replacement: Value) -> Value {
        value[field] = replacement;
        value
    }

    fn without(mut value: Value, field: &str) -> Value {
        value.as_object_mut().unwrap().remove(field);
        value
    }

    #[test]
    fn test_valid_payload() {
        let decision = validate(&base()).unwrap();
        assert_eq!(decision.route, Route::StaticRag);
        assert_eq!(decision.static_rag_query.as_deref(), Some("chapter 3 summary"));
        assert_eq!(decision.memory_requirement, MemoryRequirement::None);
        assert!(decision.context_to_preserve.is_empty());
    }

    #[test]
    fn test_not_an_object() {
        let err = validate(&json!(["route", "chat"])).unwrap_err();
        assert_eq!(err.field, "$");
    }

    #[test]
    fn test_missing_required_fields() {
        for field in [
            "route",
            "needs_static_rag",
            "needs_sql_rag",
            "needs_report",
            "response_mode",
            "confidence",
        ] {
            let err = validate(&without(base(), field)).unwrap_err();
            assert_eq!(err.field, field);
        }
    }

    #[test]
    fn test_wrong_primitive_types() {
        let err = validate(&with(base(), "confidence", json!("0.9"))).unwrap_err();
        assert_eq!(err.field, "confidence");

        let err = validate(&with(base(), "needs_report", json!(1))).unwrap_err();
        assert_eq!(err.field, "needs_report");

        let err = validate(&with(base(), "context_to_preserve", json!(["a", 2]))).unwrap_err();
        assert_eq!(err.field, "context_to_preserve");
    }

    #[test]
    fn test_null_optional_fields_are_absent() {
        let payload = with(base(), "sql_intent", Value::Null);
        let payload = with(payload, "memory_requirement", Value::Null);
        let decision = validate(&payload).unwrap();
        assert_eq!(decision.sql_intent, None);
        assert_eq!(decision.memory_requirement, MemoryRequirement::None);
    }

    #[test]
    fn test_confidence_out_of_range() {
        for bad in [json!(1.01), json!(-0.1), json!(42)] {
            let err = validate(&with(base(), "confidence", bad)).unwrap_err();
            assert_eq!(err.field, "confidence");
        }
        assert!(validate(&with(base(), "confidence", json!(0))).is_ok());
        assert!(validate(&with(base(), "confidence", json!(1))).is_ok());
    }

    #[test]
    fn test_nan_confidence_rejected_on_typed_path() {
        let mut decision = RoutingDecision::new(Route::Chat, f64::NAN);
        assert_eq!(validate_decision(&decision).unwrap_err().field, "confidence");
        decision.confidence = f64::INFINITY;
        assert_eq!(validate_decision(&decision).unwrap_err().field, "confidence");
    }

    #[test]
    fn test_unknown_enum_values() {
        let err = validate(&with(base(), "route", json!("sql"))).unwrap_err();
        assert_eq!(err.field, "route");
        assert!(err.cause.contains("sql"));

        let err = validate(&with(base(), "response_mode", json!("Direct"))).unwrap_err();
        assert_eq!(err.field, "response_mode");

        let err = validate(&with(base(), "memory_requirement", json!("forever"))).unwrap_err();
        assert_eq!(err.field, "memory_requirement");
    }

    #[test]
    fn test_need_flag_requires_companion() {
        let err = validate(&without(base(), "static_rag_query")).unwrap_err();
        assert_eq!(err.field, "static_rag_query");

        let err = validate(&with(base(), "static_rag_query", json!("   "))).unwrap_err();
        assert_eq!(err.field, "static_rag_query");

        let sql = json!({
            "route": "sql_rag",
            "needs_static_rag": false,
            "needs_sql_rag": true,
            "needs_report": false,
            "response_mode": "search_then_answer",
            "confidence": 0.5
        });
        assert_eq!(validate(&sql).unwrap_err().field, "sql_intent");
    }

    #[test]
    fn test_route_requires_its_companion_even_without_flag() {
        let mut decision = RoutingDecision::new(Route::SqlRag, 0.9);
        let err = validate_decision(&decision).unwrap_err();
        assert_eq!(err.field, "sql_intent");
        assert!(err.cause.contains("route is sql_rag"));

        decision.sql_intent = Some("orders per day".to_string());
        assert!(validate_decision(&decision).is_ok());

        let decision = RoutingDecision::new(Route::StaticRag, 0.9);
        assert_eq!(validate_decision(&decision).unwrap_err().field, "static_rag_query");

        assert!(validate_decision(&RoutingDecision::new(Route::Report, 0.9)).is_ok());
    }

    #[test]
    fn test_route_none_forbids_need_flags() {
        let payload = with(base(), "route", json!("none"));
        let err = validate(&payload).unwrap_err();
        assert_eq!(err.field, "needs_static_rag");

        let mut decision = RoutingDecision::new(Route::None, 0.4);
        decision.needs_report = true;
        assert_eq!(validate_decision(&decision).unwrap_err().field, "needs_report");
    }

    #[test]
    fn test_follow_up_without_memory_is_permitted() {
        let mut decision = RoutingDecision::new(Route::Followup, 0.8);
        decision.follow_up_needed = true;
        decision.context_to_preserve = vec!["last_invoice".to_string()];
        assert!(validate_decision(&decision).is_ok());
    }

    #[test]
    fn test_composite_plan() {
        let payload = json!({
            "route": "sql_rag",
            "needs_static_rag": false,
            "needs_sql_rag": true,
            "needs_report": true,
            "sql_intent": "monthly revenue by region",
            "response_mode": "report",
            "confidence": 0.92,
            "memory_requirement": "session",
            "follow_up_needed": true,
            "context_to_preserve": ["region_filter"]
        });
        let decision = validate(&payload).unwrap();
        assert!(decision.needs_sql_rag && decision.needs_report);
        assert_eq!(decision.memory_requirement, MemoryRequirement::Session);
        assert_eq!(decision.context_to_preserve, vec!["region_filter".to_string()]);
    }

    #[test]
    fn test_error_display() {
        let err = ValidationError::new("sql_intent", "required when needs_sql_rag is true");
        assert_eq!(
            err.to_string(),
            "invalid `sql_intent`: required when needs_sql_rag is true"
        );
    }
}
