use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::clusters::endpoint;
use crate::error::{AssistantError, Result};
use crate::models::{InferenceService, ModelSummary};

const CATALOG: &str = "bedrock";
const RUNTIME: &str = "bedrock-runtime";

/// Bedrock control-plane and runtime client authenticated with a Bedrock API
/// key sent as a bearer token.
#[derive(Clone)]
pub struct BedrockClient {
    http: reqwest::Client,
    control: Url,
    runtime: Url,
    api_key: Option<String>,
}

impl BedrockClient {
    pub fn new(control: Url, runtime: Url, api_key: Option<String>) -> Self {
        Self { http: reqwest::Client::new(), control, runtime, api_key }
    }

    fn key(&self, service: &'static str) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AssistantError::credentials(service, "set AWS_BEARER_TOKEN_BEDROCK"))
    }
}

async fn read_json<T: for<'de> Deserialize<'de>>(
    service: &'static str,
    resp: reqwest::Response,
) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let detail = resp.text().await.unwrap_or_default();
        tracing::warn!(service, %status, "bedrock request failed");
        return Err(AssistantError::service(service, format!("{status}: {}", detail.trim())));
    }
    resp.json()
        .await
        .map_err(|e| AssistantError::service(service, format!("decoding response: {e}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListFoundationModels {
    #[serde(default)]
    model_summaries: Vec<ModelSummary>,
}

#[async_trait]
impl InferenceService for BedrockClient {
    async fn list_models(&self) -> Result<Vec<ModelSummary>> {
        let key = self.key(CATALOG)?;
        let mut url = endpoint(&self.control, &["foundation-models"])?;
        url.query_pairs_mut().append_pair("byOutputModality", "TEXT");
        let resp = self
            .http
            .get(url)
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| AssistantError::service(CATALOG, e.to_string()))?;
        let body: ListFoundationModels = read_json(CATALOG, resp).await?;
        tracing::info!(count = body.model_summaries.len(), "listed foundation models");
        Ok(body.model_summaries)
    }

    async fn invoke(&self, model_id: &str, body: Value) -> Result<Value> {
        let key = self.key(RUNTIME)?;
        let url = endpoint(&self.runtime, &["model", model_id, "invoke"])?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::service(RUNTIME, e.to_string()))?;
        read_json(RUNTIME, resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer k3y")
    }

    async fn models(
        headers: HeaderMap,
        Query(q): Query<HashMap<String, String>>,
    ) -> std::result::Result<Json<Value>, StatusCode> {
        if !authorized(&headers) {
            return Err(StatusCode::FORBIDDEN);
        }
        assert_eq!(q.get("byOutputModality").map(String::as_str), Some("TEXT"));
        Ok(Json(json!({"modelSummaries": [{
            "modelId": "anthropic.claude-3-haiku-20240307-v1:0",
            "modelName": "Claude 3 Haiku",
            "providerName": "Anthropic",
            "outputModalities": ["TEXT"],
            "inputModalities": ["TEXT", "IMAGE"]
        }]})))
    }

    async fn invoke(
        headers: HeaderMap,
        Path(model): Path<String>,
        Json(body): Json<Value>,
    ) -> std::result::Result<Json<Value>, StatusCode> {
        if !authorized(&headers) {
            return Err(StatusCode::FORBIDDEN);
        }
        if model == "throttled" {
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
        let prompt = body["messages"][0]["content"].as_str().unwrap_or_default().to_string();
        Ok(Json(json!({"model": model, "content": [{"type": "text", "text": prompt}]})))
    }

    async fn spawn_fake_bedrock() -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/foundation-models", get(models))
            .route("/model/:model/invoke", post(invoke));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{addr}")).unwrap()
    }

    #[tokio::test]
    async fn lists_models_and_invokes_with_encoded_id() {
        let base = spawn_fake_bedrock().await;
        let client = BedrockClient::new(base.clone(), base, Some("k3y".into()));

        let models = client.list_models().await.unwrap();
        assert_eq!(models[0].provider_name, "Anthropic");

        let model = "anthropic.claude-3-haiku-20240307-v1:0";
        let body = json!({"messages": [{"role": "user", "content": "ping"}]});
        let out = client.invoke(model, body).await.unwrap();
        assert_eq!(out["model"], model);
        assert_eq!(out["content"][0]["text"], "ping");
    }

    #[tokio::test]
    async fn error_statuses_are_service_failures() {
        let base = spawn_fake_bedrock().await;
        let client = BedrockClient::new(base.clone(), base.clone(), Some("k3y".into()));
        let err = client.invoke("throttled", json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            AssistantError::ServiceCallFailed { service: "bedrock-runtime", .. }
        ));

        let wrong_key = BedrockClient::new(base.clone(), base, Some("nope".into()));
        let err = wrong_key.list_models().await.unwrap_err();
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn missing_key_is_credentials_error() {
        let url = Url::parse("https://bedrock.us-east-1.amazonaws.com").unwrap();
        let client = BedrockClient::new(url.clone(), url, None);
        let listed = client.list_models().await;
        assert!(matches!(listed, Err(AssistantError::CredentialsMissing { .. })));
        let invoked = client.invoke("m", json!({})).await;
        assert!(matches!(invoked, Err(AssistantError::CredentialsMissing { .. })));
    }
}
