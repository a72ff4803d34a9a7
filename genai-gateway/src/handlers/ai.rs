use crate::services::metrics;
use crate::startup::AppState;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::Serialize;
use service_core::error::AppError;
use std::time::Instant;

const PROMPT_PARAM: &str = "prompt";

/// Response envelope for `GET /ai`.
#[derive(Debug, Serialize)]
pub struct AiResponse {
    pub response: String,
}

/// Forward the `prompt` query parameter to the model unchanged and wrap the
/// generated text. When `prompt` is repeated the last value wins.
pub async fn generate(
    State(state): State<AppState>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<AiResponse>, AppError> {
    let Query(params) =
        query.map_err(|rejection| AppError::BadRequest(anyhow::anyhow!(rejection.body_text())))?;
    let prompt = last_prompt(params).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "Missing required query parameter `{}`",
            PROMPT_PARAM
        ))
    })?;

    let provider = state.text_provider.as_ref();
    let start = Instant::now();
    let result = provider.generate(&prompt).await;
    metrics::record_provider_latency(
        provider.name(),
        provider.model(),
        start.elapsed().as_secs_f64(),
    );

    match result {
        Ok(generated) => {
            metrics::record_genai_request(provider.model(), "success");
            tracing::info!(
                provider = provider.name(),
                model = provider.model(),
                prompt_len = prompt.len(),
                input_tokens = generated.input_tokens,
                output_tokens = generated.output_tokens,
                finish_reason = generated.finish_reason.as_str(),
                "Prompt answered"
            );
            Ok(Json(AiResponse {
                response: generated.text,
            }))
        }
        Err(e) => {
            metrics::record_genai_request(provider.model(), "error");
            metrics::record_provider_error(provider.name(), e.error_type());
            tracing::warn!(
                provider = provider.name(),
                model = provider.model(),
                error = %e,
                error_type = e.error_type(),
                "Model call failed"
            );
            Err(e.into())
        }
    }
}

fn last_prompt(params: Vec<(String, String)>) -> Option<String> {
    params
        .into_iter()
        .rev()
        .find(|(key, _)| key == PROMPT_PARAM)
        .map(|(_, value)| value)
}
