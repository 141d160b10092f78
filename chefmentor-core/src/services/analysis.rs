//! Failure analysis: upload a photo of a dish that went wrong.

use serde::{Deserialize, Serialize};

use super::{mime_for, path_segment};
use crate::http::{ApiClient, ApiError, MultipartForm, RequestOptions};

/// What the cook remembers about the attempt. Empty fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub heat_level: Option<String>,
    pub timing: Option<String>,
    pub modifications: Option<String>,
    pub notes: Option<String>,
}

impl AnalysisContext {
    fn fields(&self) -> [(&'static str, Option<&str>); 4] {
        [
            ("heat_level", self.heat_level.as_deref()),
            ("timing", self.timing.as_deref()),
            ("modifications", self.modifications.as_deref()),
            ("notes", self.notes.as_deref()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Moderate,
    Major,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: String,
    #[serde(default)]
    pub media_url: Option<String>,
    pub root_cause: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub tips: Vec<String>,
    pub severity: Severity,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub ai_provider: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Failure analysis endpoints.
#[derive(Clone)]
pub struct AnalysisService {
    client: ApiClient,
}

impl AnalysisService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Upload `image` for diagnosis. Uses the upload timeout.
    pub async fn analyze_failure(
        &self,
        image: Vec<u8>,
        file_name: &str,
        context: &AnalysisContext,
    ) -> Result<AnalysisResult, ApiError> {
        let mut form = MultipartForm::new().file(
            "file",
            file_name,
            mime_for(file_name, "image", "image/jpeg"),
            image,
        );
        for (name, value) in context.fields() {
            if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                form = form.text(name, value);
            }
        }

        let timeout = self.client.config().timeouts.upload;
        let response = self
            .client
            .post("/failure/analyze", form, RequestOptions::new().timeout(timeout))
            .await?;
        response.json()
    }

    pub async fn get_analysis(&self, analysis_id: &str) -> Result<AnalysisResult, ApiError> {
        let path = format!("/failure/{}", path_segment(analysis_id));
        self.client.get_json(&path, RequestOptions::new()).await
    }
}
