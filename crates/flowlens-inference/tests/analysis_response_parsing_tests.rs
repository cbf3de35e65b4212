//! Integration tests for analyze response parsing.

use flowlens_inference::parse_suggestions;

const THREE_SUGGESTIONS: &str = r#"[
  {"id":"a","title":"Rename invoices","estimatedTimeSavings":"5 min/day","tools":["Power Automate"],"description":"Files renamed by hand","relevanceScore":40},
  {"id":"b","title":"Sync CRM to sheet","estimatedTimeSavings":"30 min/day","tools":["Zapier","Sheets"],"description":"Copying rows","relevanceScore":90},
  {"id":"c","title":"Weekly export","estimatedTimeSavings":"1 hour/week","tools":[],"description":"Same menu path every Friday","relevanceScore":70}
]"#;

#[test]
fn analysis_response_parsing_tests_orders_by_relevance() {
    let suggestions = parse_suggestions(THREE_SUGGESTIONS);

    let scores: Vec<u8> = suggestions.iter().map(|item| item.relevance_score).collect();
    assert_eq!(scores, vec![90, 70, 40]);
    assert_eq!(suggestions[0].tools, vec!["Zapier", "Sheets"]);
}

#[test]
fn analysis_response_parsing_tests_treats_garbage_as_zero_suggestions() {
    assert!(parse_suggestions("").is_empty());
    assert!(parse_suggestions("   ").is_empty());
    assert!(parse_suggestions("I could not find anything").is_empty());
    assert!(parse_suggestions(r#"[{"id":"a","title":"missing fields"}]"#).is_empty());
}

#[test]
fn analysis_response_parsing_tests_accepts_fenced_and_wrapped_bodies() {
    let fenced = format!("```json\n{THREE_SUGGESTIONS}\n```");
    assert_eq!(parse_suggestions(&fenced).len(), 3);

    let wrapped = format!(r#"{{"suggestions": {THREE_SUGGESTIONS}}}"#);
    assert_eq!(parse_suggestions(&wrapped)[0].id, "b");
}

#[test]
fn analysis_response_parsing_tests_drops_out_of_range_scores() {
    let body = r#"[
      {"id":"high","title":"Too eager","estimatedTimeSavings":"1 min","tools":[],"description":"","relevanceScore":150},
      {"id":"zero","title":"Not relevant","estimatedTimeSavings":"1 min","tools":[],"description":"","relevanceScore":0},
      {"id":"ok","title":"Fill timesheet","estimatedTimeSavings":"10 min/day","tools":["Sheets"],"description":"","relevanceScore":100}
    ]"#;

    let ids: Vec<String> = parse_suggestions(body).into_iter().map(|item| item.id).collect();
    assert_eq!(ids, vec!["ok".to_string()]);
}

#[test]
fn analysis_response_parsing_tests_keeps_valid_items_beside_oversized_score() {
    let body = r#"[
      {"id":"keep","title":"Sync CRM to sheet","estimatedTimeSavings":"30 min/day","tools":["Zapier"],"description":"Copying rows","relevanceScore":90},
      {"id":"huge","title":"Overflowing score","estimatedTimeSavings":"1 min","tools":[],"description":"","relevanceScore":300},
      {"id":"half","title":"Missing description","relevanceScore":50}
    ]"#;

    let suggestions = parse_suggestions(body);
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].id, "keep");
    assert_eq!(suggestions[0].relevance_score, 90);
}
