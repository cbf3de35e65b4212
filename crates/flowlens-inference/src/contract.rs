//! Response contract parsing for analyze and elaborate calls.

use flowlens_core::{
    Guide, MAX_RELEVANCE_SCORE, MIN_RELEVANCE_SCORE, Suggestion, sort_by_relevance,
};
use serde::Deserialize;
use serde_json::Value;

use crate::InferenceError;

/// Parses an analyze response into relevance-ordered suggestions.
///
/// An empty or non-deserializable body yields zero suggestions; the caller
/// never has to treat a confused model as a fatal error. Items are checked
/// one by one: a malformed item or a relevance score outside
/// `MIN_RELEVANCE_SCORE..=MAX_RELEVANCE_SCORE` drops that item only.
pub fn parse_suggestions(raw: &str) -> Vec<Suggestion> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        tracing::debug!("analysis response is empty");
        return Vec::new();
    }

    let items = match serde_json::from_str::<SuggestionsBody>(body) {
        Ok(SuggestionsBody::List(items)) => items,
        Ok(SuggestionsBody::Wrapped { suggestions }) => suggestions,
        Err(error) => {
            tracing::warn!(%error, "analysis response does not match contract; treating as empty");
            return Vec::new();
        }
    };

    let mut suggestions: Vec<Suggestion> = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| accept_item(index, item))
        .collect();
    sort_by_relevance(&mut suggestions);
    suggestions
}

fn accept_item(index: usize, item: Value) -> Option<Suggestion> {
    let item: SuggestionItem = match serde_json::from_value(item) {
        Ok(item) => item,
        Err(error) => {
            tracing::warn!(index, %error, "dropping malformed suggestion");
            return None;
        }
    };

    let Some(relevance_score) = u8::try_from(item.relevance_score)
        .ok()
        .filter(|score| (MIN_RELEVANCE_SCORE..=MAX_RELEVANCE_SCORE).contains(score))
    else {
        tracing::warn!(
            index,
            score = item.relevance_score,
            "dropping suggestion with out-of-range relevance score"
        );
        return None;
    };

    Some(Suggestion {
        id: item.id,
        title: item.title,
        estimated_time_savings: item.estimated_time_savings,
        tools: item.tools,
        description: item.description,
        relevance_score,
    })
}

/// Parses an elaborate response and stamps the originating suggestion id.
///
/// # Errors
/// Returns [`InferenceError::EmptyResponse`] for a blank body,
/// [`InferenceError::Decode`] when the body is not a guide, and
/// [`InferenceError::InvalidContract`] when a required field is blank.
pub fn parse_guide(raw: &str, suggestion_id: &str) -> Result<Guide, InferenceError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(InferenceError::EmptyResponse);
    }

    let mut guide: Guide = serde_json::from_str(body).map_err(InferenceError::Decode)?;

    if guide.title.trim().is_empty() {
        return Err(InferenceError::InvalidContract("guide title is empty".to_string()));
    }
    if let Some(step) = guide
        .steps
        .iter()
        .find(|step| step.instruction.trim().is_empty())
    {
        return Err(InferenceError::InvalidContract(format!(
            "step {} has no instruction",
            step.step_number
        )));
    }

    guide.suggestion_id = suggestion_id.to_string();
    Ok(guide)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SuggestionsBody {
    List(Vec<Value>),
    Wrapped { suggestions: Vec<Value> },
}

/// Wire shape of one suggestion; the score is wide so a single bad value
/// cannot fail the whole batch.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuggestionItem {
    id: String,
    title: String,
    estimated_time_savings: String,
    tools: Vec<String>,
    description: String,
    relevance_score: i64,
}

/// Removes a surrounding Markdown code fence, which some models add even
/// when asked for bare JSON.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let rest = rest.strip_suffix("```").unwrap_or(rest);
    match rest.split_once('\n') {
        Some((language, body)) if !language.trim_start().starts_with(['{', '[']) => body.trim(),
        _ => rest.trim(),
    }
}
