//! Fixed instruction payloads and response schemas sent with each request.

use flowlens_core::Suggestion;
use serde_json::{Value, json};

/// Instruction sent with every analyze request.
pub const ANALYSIS_INSTRUCTION: &str = "\
You are an automation consultant looking at a screenshot of someone's screen. \
Identify repetitive workflows visible on screen that could be automated: manual \
data entry, copying values between applications, repeated form filling, \
renaming or moving files by hand, recurring report exports, or clicking through \
the same sequence of menus. Ignore one-off creative work. \
Return a JSON array. Each element must contain: id (short unique string), \
title, estimatedTimeSavings (free text such as \"15 minutes per day\"), tools \
(array of tool or product names), description, and relevanceScore (integer from \
1 to 100, higher means more clearly repetitive and more valuable to automate). \
Return an empty array when nothing on screen is worth automating.";

/// Builds the instruction sent with an elaborate request.
pub fn elaboration_instruction(suggestion: &Suggestion) -> String {
    let tools = if suggestion.tools.is_empty() {
        "any suitable tool".to_string()
    } else {
        suggestion.tools.join(", ")
    };

    format!(
        "You are writing a step-by-step guide that automates the following workflow, \
         using the attached screenshot as context for what the user currently sees.\n\
         Workflow: {title}\n\
         Description: {description}\n\
         Suggested tools: {tools}\n\
         Return a JSON object with: title, prerequisites (array of strings), and steps \
         (array). Number steps from 1 in order with stepNumber. Every step needs an \
         instruction. Add selectorDescription when the step refers to something visible \
         on screen, codeSnippet when the user should paste code or a formula, and tip \
         for useful context. Omit optional fields that do not apply.",
        title = suggestion.title,
        description = suggestion.description,
    )
}

/// Response schema for analyze requests.
pub fn suggestions_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "id": { "type": "STRING" },
                "title": { "type": "STRING" },
                "estimatedTimeSavings": { "type": "STRING" },
                "tools": { "type": "ARRAY", "items": { "type": "STRING" } },
                "description": { "type": "STRING" },
                "relevanceScore": { "type": "INTEGER" }
            },
            "required": [
                "id",
                "title",
                "estimatedTimeSavings",
                "tools",
                "description",
                "relevanceScore"
            ]
        }
    })
}

/// Response schema for elaborate requests.
pub fn guide_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING" },
            "prerequisites": { "type": "ARRAY", "items": { "type": "STRING" } },
            "steps": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "stepNumber": { "type": "INTEGER" },
                        "instruction": { "type": "STRING" },
                        "selectorDescription": { "type": "STRING" },
                        "codeSnippet": { "type": "STRING" },
                        "tip": { "type": "STRING" }
                    },
                    "required": ["stepNumber", "instruction"]
                }
            }
        },
        "required": ["title", "prerequisites", "steps"]
    })
}
