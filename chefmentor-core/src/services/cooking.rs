//! Live cooking sessions.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;

use super::path_segment;
use crate::http::{ApiClient, ApiError, RequestOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookingSession {
    pub id: String,
    pub recipe_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub demo_session_id: Option<String>,
    pub status: SessionStatus,
    /// The backend sends this as either a number or a numeric string.
    #[serde(default, deserialize_with = "step_index")]
    pub current_step_index: u32,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

fn step_index<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Index {
        Number(u32),
        Text(String),
    }

    match Option::<Index>::deserialize(deserializer)? {
        None => Ok(0),
        Some(Index::Number(n)) => Ok(n),
        Some(Index::Text(s)) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// The step a session is on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepData {
    pub step_number: u32,
    pub instruction: String,
    #[serde(default)]
    pub expected_state: Option<String>,
    #[serde(default)]
    pub is_last_step: bool,
    #[serde(default)]
    pub guidance: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CookingOutcome {
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCookFeedback {
    pub emoji: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Cooking session endpoints.
#[derive(Clone)]
pub struct CookingService {
    client: ApiClient,
}

impl CookingService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Start a session for `recipe_id`. Guests pass their demo session id.
    pub async fn start_session(
        &self,
        recipe_id: &str,
        demo_session_id: Option<&str>,
    ) -> Result<CookingSession, ApiError> {
        let body = json!({
            "recipe_id": recipe_id,
            "demo_session_id": demo_session_id,
        });
        self.client
            .post_json("/cooking/start", &body, RequestOptions::new())
            .await
    }

    pub async fn current_step(&self, session_id: &str) -> Result<StepData, ApiError> {
        let path = format!("/cooking/{}/current", path_segment(session_id));
        self.client.get_json(&path, RequestOptions::new()).await
    }

    pub async fn advance_step(&self, session_id: &str) -> Result<StepData, ApiError> {
        let response = self
            .client
            .post(
                &format!("/cooking/{}/next", path_segment(session_id)),
                (),
                RequestOptions::new(),
            )
            .await?;
        response.json()
    }

    pub async fn complete_session(
        &self,
        session_id: &str,
        outcome: CookingOutcome,
        rating: Option<u8>,
    ) -> Result<(), ApiError> {
        let mut body = json!({ "result": outcome });
        if let Some(rating) = rating {
            body["rating"] = json!(rating);
        }
        self.client
            .post(
                &format!("/cooking/{}/complete", path_segment(session_id)),
                body,
                RequestOptions::new(),
            )
            .await?;
        Ok(())
    }

    pub async fn save_feedback(
        &self,
        session_id: &str,
        feedback: &PostCookFeedback,
    ) -> Result<(), ApiError> {
        let body = serde_json::to_value(feedback)
            .map_err(|e| ApiError::invalid_request(e.to_string()))?;
        self.client
            .post(
                &format!("/cooking/{}/feedback", path_segment(session_id)),
                body,
                RequestOptions::new(),
            )
            .await?;
        Ok(())
    }
}
