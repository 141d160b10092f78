//! Typed wrappers over the backend endpoints.
//!
//! Each service holds a clone of the shared [`ApiClient`](crate::http::ApiClient),
//! so they all go through the same token refresh coordination.

pub mod analysis;
pub mod cooking;
pub mod recipes;
pub mod voice;

pub use analysis::{AnalysisContext, AnalysisResult, AnalysisService, Severity};
pub use cooking::{CookingOutcome, CookingService, CookingSession, PostCookFeedback, SessionStatus, StepData};
pub use recipes::{Recipe, RecipeList, RecipeService, RecipeSource, RecipeStep};
pub use voice::{Intent, VoiceIntent, VoiceService};

/// `value` percent-encoded for use as a single path segment.
fn path_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Extension of `file_name`, lowercased.
fn extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// `{kind}/{extension}`, or `fallback` when the name has no usable extension.
fn mime_for(file_name: &str, kind: &str, fallback: &str) -> String {
    match extension(file_name) {
        Some(ext) => format!("{}/{}", kind, ext),
        None => fallback.to_string(),
    }
}
