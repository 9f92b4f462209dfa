use super::*;
use crate::decision::validator::validate_decision;
use serde_json::json;

fn text(s: &str) -> DecisionPayload {
    DecisionPayload::Text(s.to_string())
}

const FULL: &str = r#"{
    "route": "static_rag",
    "needs_static_rag": true,
    "needs_sql_rag": false,
    "needs_report": false,
    "static_rag_query": "chapter 3 summary",
    "response_mode": "search_then_answer",
    "confidence": 0.9,
    "reasoning": "asks about a document"
}"#;

#[test]
fn test_complete_payload_is_not_degraded() {
    let parsed = parse(&text(FULL));
    assert!(!parsed.degraded, "{:?}", parsed.diagnostics);
    assert_eq!(parsed.decision.route, Route::StaticRag);
    assert_eq!(parsed.decision.confidence, 0.9);
    assert_eq!(parsed.decision.reasoning, "asks about a document");
    assert!(validate_decision(&parsed.decision).is_ok());
}

#[test]
fn test_structured_payload() {
    let parsed = parse(&DecisionPayload::Structured(json!({
        "route": "chat",
        "needs_static_rag": false,
        "needs_sql_rag": false,
        "needs_report": false,
        "response_mode": "direct",
        "confidence": 0.7
    })));
    assert!(!parsed.degraded);
    assert_eq!(parsed.decision, RoutingDecision::new(Route::Chat, 0.7));
}

#[test]
fn test_fenced_block_with_prose() {
    let raw = format!("Sure! Here is the decision:\n```json\n{FULL}\n```\nLet me know.");
    let parsed = parse(&text(&raw));
    assert_eq!(parsed.decision.route, Route::StaticRag);
    assert!(!parsed.degraded);
}

#[test]
fn test_last_embedded_object_wins() {
    let raw = r#"Draft: {"route": "chat"} Final answer: {"route": "report", "needs_static_rag": false, "needs_sql_rag": false, "needs_report": true, "response_mode": "report", "confidence": 0.85}"#;
    let parsed = parse(&text(raw));
    assert_eq!(parsed.decision.route, Route::Report);
    assert!(parsed.decision.needs_report);
}

#[test]
fn test_nested_object_is_not_mistaken_for_the_payload() {
    assert_eq!(
        top_level_objects(r#"x {"a": {"b": 1}, "c": [1, {"d": 2}]} y {"e": "}"}"#),
        vec![r#"{"a": {"b": 1}, "c": [1, {"d": 2}]}"#, r#"{"e": "}"}"#]
    );
}

#[test]
fn test_repairs_trailing_commas_and_single_quotes() {
    let raw = "{'route': 'chat', 'needs_static_rag': false, 'needs_sql_rag': false, \
               'needs_report': false, 'response_mode': 'direct', 'confidence': 0.8,}";
    let parsed = parse(&text(raw));
    assert_eq!(parsed.decision.route, Route::Chat);
    assert_eq!(parsed.decision.confidence, 0.8);
    assert!(parsed.degraded);
    assert!(parsed.diagnostics.iter().any(|d| d.contains("repair")));
}

#[test]
fn test_truncated_inside_string_value() {
    let raw = r#"{"needs_sql_rag": true, "needs_static_rag": false, "route": "sq"#;
    let parsed = parse(&text(raw));
    assert!(parsed.degraded);
    assert_eq!(parsed.decision.route, Route::None);
    assert!(parsed.decision.needs_sql_rag);
    assert!(parsed.diagnostics.iter().any(|d| d.contains("truncated")));
}

#[test]
fn test_truncated_after_key_drops_dangling_member() {
    let raw = r#"{"route": "sql_rag", "needs_sql_rag": true, "sql_intent": "top customers", "confidence": 0.9, "response_"#;
    let parsed = parse(&text(raw));
    assert_eq!(parsed.decision.route, Route::SqlRag);
    assert_eq!(parsed.decision.sql_intent.as_deref(), Some("top customers"));
    assert_eq!(parsed.decision.confidence, 0.9);
    assert_eq!(parsed.decision.response_mode, ResponseMode::Direct);
    assert!(parsed
        .diagnostics
        .iter()
        .any(|d| d.starts_with("response_mode missing")));
}

#[test]
fn test_truncated_nested_array() {
    let raw = r#"{"route": "followup", "confidence": 0.8, "context_to_preserve": ["invoice_id", "cust"#;
    let parsed = parse(&text(raw));
    assert_eq!(parsed.decision.route, Route::Followup);
    assert_eq!(
        parsed.decision.context_to_preserve,
        vec!["invoice_id".to_string(), "cust".to_string()]
    );
}

#[test]
fn test_truncated_partial_literal() {
    let raw = r#"{"route": "chat", "confidence": 0.75, "needs_report": tr"#;
    let parsed = parse(&text(raw));
    assert_eq!(parsed.decision.route, Route::Chat);
    assert_eq!(parsed.decision.confidence, 0.75);
    assert!(!parsed.decision.needs_report);
}

#[test]
fn test_no_json_at_all_defaults_everything() {
    for raw in ["", "I think this is a database question.", "route: chat"] {
        let parsed = parse(&text(raw));
        assert!(parsed.degraded);
        assert_eq!(parsed.decision, RoutingDecision::new(Route::None, 0.0));
        assert_eq!(parsed.decision.memory_requirement, MemoryRequirement::None);
    }
}

#[test]
fn test_non_object_structured_payload() {
    let parsed = parse(&DecisionPayload::Structured(json!([1, 2, 3])));
    assert!(parsed.degraded);
    assert_eq!(parsed.decision.route, Route::None);

    let parsed = parse(&DecisionPayload::Structured(json!(
        r#"{"route": "chat", "confidence": 0.6}"#
    )));
    assert_eq!(parsed.decision.route, Route::Chat);
    assert!(parsed.degraded);
}

#[test]
fn test_keys_are_case_insensitive() {
    let parsed = parse(&text(r#"{"Route": "Chat", "CONFIDENCE": 0.65, "Response_Mode": "DIRECT"}"#));
    assert_eq!(parsed.decision.route, Route::Chat);
    assert_eq!(parsed.decision.confidence, 0.65);
    assert_eq!(parsed.decision.response_mode, ResponseMode::Direct);
}

#[test]
fn test_unknown_enum_values_default() {
    let parsed = parse(&text(
        r#"{"route": "weather", "response_mode": "poem", "memory_requirement": "forever", "confidence": 0.5}"#,
    ));
    assert_eq!(parsed.decision.route, Route::None);
    assert_eq!(parsed.decision.response_mode, ResponseMode::Direct);
    assert_eq!(parsed.decision.memory_requirement, MemoryRequirement::None);
    assert_eq!(parsed.diagnostics.len(), 6);
}

#[test]
fn test_legacy_rag_type() {
    let parsed = parse(&text(
        r#"{"rag_type": "both", "static_rag_query": "q", "sql_intent": "i", "confidence": 0.8}"#,
    ));
    assert_eq!(parsed.decision.route, Route::SqlRag);
    assert!(parsed.decision.needs_static_rag);
    assert!(parsed.decision.needs_sql_rag);

    let parsed = parse(&text(r#"{"rag_type": "none", "needs_static_rag": false}"#));
    assert_eq!(parsed.decision.route, Route::Chat);
    assert!(!parsed.decision.needs_static_rag);
}

#[test]
fn test_explicit_route_beats_rag_type() {
    let parsed = parse(&text(r#"{"route": "report", "rag_type": "sql"}"#));
    assert_eq!(parsed.decision.route, Route::Report);
    assert!(!parsed.decision.needs_sql_rag);
}

#[test]
fn test_confidence_coercions() {
    let cases = [
        (json!("0.8"), 0.8),
        (json!("high"), 0.9),
        (json!("Medium"), 0.6),
        (json!("low"), 0.3),
        (json!("85%"), 0.85),
        (json!("very sure"), 0.0),
        (json!(true), 0.0),
    ];
    for (raw, expected) in cases {
        let parsed = parse(&DecisionPayload::Structured(json!({ "confidence": raw })));
        assert!((parsed.decision.confidence - expected).abs() < 1e-9, "{raw}");
        assert!(parsed.degraded);
    }
}

#[test]
fn test_out_of_range_confidence_is_not_clamped() {
    let parsed = parse(&text(r#"{"route": "chat", "confidence": 1.7}"#));
    assert_eq!(parsed.decision.confidence, 1.7);
    assert!(validate_decision(&parsed.decision).is_err());
}

#[test]
fn test_boolean_coercions() {
    let parsed = parse(&DecisionPayload::Structured(json!({
        "route": "sql_rag",
        "needs_sql_rag": "true",
        "needs_static_rag": 0,
        "needs_report": "maybe",
        "follow_up_needed": "yes"
    })));
    assert!(parsed.decision.needs_sql_rag);
    assert!(!parsed.decision.needs_static_rag);
    assert!(!parsed.decision.needs_report);
    assert!(parsed.decision.follow_up_needed);
}

#[test]
fn test_optional_fields() {
    let parsed = parse(&DecisionPayload::Structured(json!({
        "route": "followup",
        "memory_requirement": "session",
        "follow_up_needed": true,
        "context_to_preserve": "last_report",
        "sql_intent": 42
    })));
    assert_eq!(parsed.decision.memory_requirement, MemoryRequirement::Session);
    assert_eq!(parsed.decision.context_to_preserve, vec!["last_report".to_string()]);
    assert_eq!(parsed.decision.sql_intent.as_deref(), Some("42"));
}

#[test]
fn test_parse_never_panics_on_garbage() {
    let inputs = [
        "{",
        "}",
        "{{{{",
        "{\"",
        "{\"\\",
        "[{]",
        "```json\n{\n```",
        "{\"route\": \"chat\", \"confidence\": 0.9}}}}",
        "\u{0}\u{1}{\u{2}}",
        "{'a': 'it's'}",
    ];
    for raw in inputs {
        let parsed = parse(&text(raw));
        assert!(parsed.decision.confidence.is_finite());
    }
}

#[test]
fn test_absent_flags_follow_route() {
    let parsed = parse(&DecisionPayload::Structured(json!({"route": "sql_rag", "confidence": 0.5})));
    assert!(parsed.decision.needs_sql_rag);
    assert!(!parsed.decision.needs_static_rag && !parsed.decision.needs_report);
    assert!(parsed
        .diagnostics
        .iter()
        .any(|d| d == "needs_sql_rag missing; defaulted to true"));

    let parsed = parse(&DecisionPayload::Structured(json!({"route": "report", "confidence": 0.9})));
    assert!(parsed.decision.needs_report);

    let parsed = parse(&DecisionPayload::Structured(
        json!({"route": "static_rag", "needs_static_rag": false, "confidence": 0.9}),
    ));
    assert!(!parsed.decision.needs_static_rag);
}
