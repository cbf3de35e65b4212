//! Shared fixtures for history integration tests.

use flowlens_core::{Guide, Step};

/// Creates a guide whose title carries `index` for ordering checks.
#[allow(dead_code)]
pub fn numbered_guide(index: usize) -> Guide {
    Guide {
        suggestion_id: format!("suggestion-{index}"),
        title: format!("Guide {index}"),
        prerequisites: vec![],
        steps: vec![Step {
            step_number: 1,
            instruction: "Open the app".to_string(),
            selector_description: None,
            code_snippet: None,
            tip: None,
        }],
    }
}

/// Creates a guide mixing present and absent optional step fields.
#[allow(dead_code)]
pub fn detailed_guide() -> Guide {
    Guide {
        suggestion_id: "sync-crm".to_string(),
        title: "Sync CRM rows to a sheet".to_string(),
        prerequisites: vec!["Zapier account".to_string()],
        steps: vec![
            Step {
                step_number: 1,
                instruction: "Create a Zap".to_string(),
                selector_description: Some("Create button, top left".to_string()),
                code_snippet: None,
                tip: None,
            },
            Step {
                step_number: 2,
                instruction: "Map the columns".to_string(),
                selector_description: None,
                code_snippet: Some("=A2&B2".to_string()),
                tip: Some("Keep header names identical".to_string()),
            },
            Step {
                step_number: 3,
                instruction: "Turn it on".to_string(),
                selector_description: None,
                code_snippet: None,
                tip: None,
            },
        ],
    }
}
