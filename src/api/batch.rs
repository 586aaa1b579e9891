//! Batch image analysis.

use std::path::Path;

use reqwest::Method;
use reqwest::multipart::Form;

use super::error::{ApiError, ApiResult};
use super::ids::AnalysisId;
use super::types::{Attachment, BatchAnalysis, BatchAnalysisDetails, CreateAnalysisResponse};
use super::{ApiClient, ensure_success, expect_json};

impl ApiClient {
    /// Submit images for analysis with a shared prompt.
    ///
    /// Non-image attachments are dropped.
    ///
    /// # Errors
    /// Returns a validation error for an empty title or prompt, or when no
    /// image remains; otherwise the backend error.
    pub async fn create_analysis(
        &self,
        title: &str,
        prompt: &str,
        images: &[Attachment],
        token: &str,
    ) -> ApiResult<CreateAnalysisResponse> {
        let title = title.trim();
        let prompt = prompt.trim();
        if title.is_empty() || prompt.is_empty() {
            return Err(ApiError::validation("analysis title and prompt must not be empty"));
        }

        let mut form = Form::new()
            .text("title", title.to_string())
            .text("prompt", prompt.to_string())
            .text("base_url", self.base_url().as_str().trim_end_matches('/').to_string());

        let mut accepted = 0_usize;
        for image in images {
            if !image.is_image() {
                tracing::warn!(
                    file = %image.file_name,
                    mime = %image.mime,
                    "skipping non-image file"
                );
                continue;
            }
            form = form.part("files", image.to_part()?);
            accepted += 1;
        }
        if accepted == 0 {
            return Err(ApiError::validation("at least one image is required"));
        }

        let response = self
            .authorized(Method::POST, "bunch_analyze", token)?
            .multipart(form)
            .send()
            .await?;
        expect_json(response).await
    }

    /// List past analyses.
    ///
    /// # Errors
    /// Returns the backend error.
    pub async fn list_analyses(&self, token: &str) -> ApiResult<Vec<BatchAnalysis>> {
        let response = self
            .authorized(Method::GET, "list_analyses", token)?
            .send()
            .await?;
        expect_json(response).await
    }

    /// Fetch one analysis with all per-image results.
    ///
    /// # Errors
    /// Returns the backend error.
    pub async fn get_analysis(
        &self,
        id: AnalysisId,
        token: &str,
    ) -> ApiResult<BatchAnalysisDetails> {
        let response = self
            .authorized(Method::GET, &format!("get_analysis/{id}"), token)?
            .send()
            .await?;
        expect_json(response).await
    }

    /// Download the CSV export of an analysis.
    ///
    /// # Errors
    /// Returns the backend error.
    pub async fn download_analysis(&self, id: AnalysisId, token: &str) -> ApiResult<Vec<u8>> {
        let response = self
            .authorized(Method::GET, &format!("download_analysis/{id}"), token)?
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Download the CSV export of an analysis into a file.
    ///
    /// # Errors
    /// Returns the backend error or a file write error.
    pub async fn download_analysis_to(
        &self,
        id: AnalysisId,
        token: &str,
        path: impl AsRef<Path>,
    ) -> ApiResult<usize> {
        let csv = self.download_analysis(id, token).await?;
        tokio::fs::write(path.as_ref(), &csv).await?;
        tracing::debug!(
            analysis_id = %id,
            path = %path.as_ref().display(),
            bytes = csv.len(),
            "analysis exported"
        );
        Ok(csv.len())
    }
}
