//! Integration tests for elaborate response parsing.

use flowlens_inference::{InferenceError, parse_guide};

const GUIDE: &str = r#"{
  "title": "Sync CRM rows to a sheet",
  "prerequisites": ["Zapier account", "Sheet with headers"],
  "steps": [
    {"stepNumber": 1, "instruction": "Create a new Zap", "selectorDescription": "Orange 'Create' button, top left"},
    {"stepNumber": 2, "instruction": "Map the columns", "codeSnippet": "=A2&\" \"&B2", "tip": "Keep header names identical"},
    {"stepNumber": 3, "instruction": "Turn the Zap on"}
  ]
}"#;

#[test]
fn guide_response_parsing_tests_stamps_suggestion_id() {
    let guide = parse_guide(GUIDE, "b").expect("guide should parse");

    assert_eq!(guide.suggestion_id, "b");
    assert_eq!(guide.prerequisites.len(), 2);
    assert_eq!(guide.steps.len(), 3);
}

#[test]
fn guide_response_parsing_tests_keeps_optional_fields_exactly() {
    let guide = parse_guide(GUIDE, "b").expect("guide should parse");

    assert_eq!(
        guide.steps[0].selector_description.as_deref(),
        Some("Orange 'Create' button, top left")
    );
    assert_eq!(guide.steps[0].code_snippet, None);
    assert_eq!(guide.steps[1].tip.as_deref(), Some("Keep header names identical"));
    assert_eq!(guide.steps[2].selector_description, None);
    assert_eq!(guide.steps[2].tip, None);
}

#[test]
fn guide_response_parsing_tests_rejects_malformed_bodies() {
    assert!(matches!(parse_guide("", "b"), Err(InferenceError::EmptyResponse)));
    assert!(matches!(
        parse_guide("{\"title\": 3}", "b"),
        Err(InferenceError::Decode(_))
    ));
    assert!(matches!(
        parse_guide(r#"{"title":"T","prerequisites":[],"steps":[{"stepNumber":1,"instruction":" "}]}"#, "b"),
        Err(InferenceError::InvalidContract(_))
    ));
}

#[test]
fn guide_response_parsing_tests_does_not_renumber_steps() {
    let raw = r#"{"title":"T","prerequisites":[],"steps":[
        {"stepNumber":1,"instruction":"one"},
        {"stepNumber":4,"instruction":"four"}
    ]}"#;
    let guide = parse_guide(raw, "x").expect("guide should parse");

    assert_eq!(guide.steps[1].step_number, 4);
    assert!(guide.check_step_numbering().is_err());
}
