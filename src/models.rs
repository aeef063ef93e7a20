use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AssistantError, Result};
use crate::family::ModelFamily;
use crate::settings::EffectiveParams;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub model_id: String,
    pub model_name: String,
    pub provider_name: String,
    #[serde(default)]
    pub output_modalities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub model: String,
    pub prompt: String,
    pub params: EffectiveParams,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelResponse {
    pub content: String,
    pub model: String,
}

/// Model catalog plus raw invocation. Bodies are family-specific JSON.
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelSummary>>;
    async fn invoke(&self, model_id: &str, body: Value) -> Result<Value>;
}

/// Keeps text-output models of a supported family whose id matches none of
/// the `excluded` substrings.
pub fn text_models(models: Vec<ModelSummary>, excluded: &[String]) -> Vec<ModelSummary> {
    models
        .into_iter()
        .filter(|m| m.output_modalities.iter().any(|o| o.eq_ignore_ascii_case("TEXT")))
        .filter(|m| ModelFamily::from_model_id(&m.model_id).is_supported())
        .filter(|m| !excluded.iter().any(|x| m.model_id.contains(x.as_str())))
        .collect()
}

pub async fn generate(service: &dyn InferenceService, req: &ModelRequest) -> Result<ModelResponse> {
    let family = ModelFamily::from_model_id(&req.model);
    if !family.is_supported() {
        return Err(AssistantError::UnsupportedModel(req.model.clone()));
    }
    let body = family.build_request(&req.model, &req.prompt, &req.params)?;
    tracing::debug!(model = %req.model, family = family.label(), "invoking model");

    let outcome = match service.invoke(&req.model, body).await {
        Ok(raw) => family.parse_response(raw),
        Err(e) => Err(e),
    };
    let label = if outcome.is_ok() { "ok" } else { "error" };
    metrics::counter!(
        "assistant_model_invocations_total",
        "family" => family.label(),
        "outcome" => label
    )
    .increment(1);

    let content = outcome?;
    Ok(ModelResponse { content, model: req.model.clone() })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Scripted inference backend recording every invocation.
    #[derive(Default)]
    pub struct FakeInference {
        pub models: Vec<ModelSummary>,
        pub reply: Option<Value>,
        pub fail_with: Option<fn() -> AssistantError>,
        pub calls: Mutex<Vec<(String, Value)>>,
    }

    impl FakeInference {
        pub fn replying(text: &str) -> Self {
            Self {
                reply: Some(serde_json::json!({"content": [{"type": "text", "text": text}]})),
                ..Default::default()
            }
        }

        pub fn failing(f: fn() -> AssistantError) -> Self {
            Self { fail_with: Some(f), ..Default::default() }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl InferenceService for FakeInference {
        async fn list_models(&self) -> Result<Vec<ModelSummary>> {
            Ok(self.models.clone())
        }

        async fn invoke(&self, model_id: &str, body: Value) -> Result<Value> {
            self.calls.lock().unwrap().push((model_id.to_string(), body));
            if let Some(f) = self.fail_with {
                return Err(f());
            }
            Ok(self.reply.clone().unwrap_or(Value::Null))
        }
    }

    pub fn summary(id: &str, modalities: &[&str]) -> ModelSummary {
        ModelSummary {
            model_id: id.into(),
            model_name: id.into(),
            provider_name: id.split('.').next().unwrap_or_default().into(),
            output_modalities: modalities.iter().map(|s| s.to_string()).collect(),
        }
    }
}
