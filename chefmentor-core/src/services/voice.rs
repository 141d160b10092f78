//! Hands-free voice commands: speech-to-text and intent parsing.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::mime_for;
use crate::http::{ApiClient, ApiError, ErrorKind, MultipartForm, RequestOptions};

/// Speech-to-text gets a shorter timeout than other uploads.
pub const STT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Intent {
    Next,
    Prev,
    Repeat,
    Timer,
    Ingredient,
    Pause,
    Resume,
    Help,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceIntent {
    pub intent: Intent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VoiceIntent {
    pub fn new(intent: Intent) -> Self {
        Self {
            intent,
            duration_seconds: None,
            ingredient: None,
            error: None,
        }
    }
}

#[derive(Deserialize)]
struct Transcription {
    #[serde(default)]
    text: Option<String>,
}

/// Voice endpoints.
#[derive(Clone)]
pub struct VoiceService {
    client: ApiClient,
}

impl VoiceService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Upload recorded audio and return the transcript.
    pub async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, ApiError> {
        let form = MultipartForm::new().file(
            "file",
            file_name,
            mime_for(file_name, "audio", "audio/wav"),
            audio,
        );
        let response = self
            .client
            .post("/voice/stt", form, RequestOptions::new().timeout(STT_TIMEOUT))
            .await?;

        let transcription: Transcription = response.json()?;
        match transcription.text.filter(|t| !t.trim().is_empty()) {
            Some(text) => {
                debug!(%text, "Transcribed voice command");
                Ok(text)
            }
            None => Err(ApiError::new(ErrorKind::InvalidBody, "Could not transcribe audio")
                .with_status(response.status)),
        }
    }

    /// Ask the backend to classify a command.
    pub async fn parse_command(&self, text: &str) -> Result<VoiceIntent, ApiError> {
        self.client
            .post_json("/voice/command", &json!({ "text": text }), RequestOptions::new())
            .await
    }

    /// Transcribe a recording and parse the result.
    pub async fn command_from_audio(
        &self,
        audio: Vec<u8>,
        file_name: &str,
    ) -> Result<VoiceIntent, ApiError> {
        let text = self.transcribe(audio, file_name).await?;
        self.parse_command(&text).await
    }
}
