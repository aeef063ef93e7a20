//! Request and response shapes of the Bedrock model families this service
//! knows how to talk to.
//!
//! Each family owns one request builder and one response parser. Model ids
//! that match no family resolve to [`ModelFamily::Unsupported`], which fails
//! before anything is sent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AssistantError, Result};
use crate::settings::EffectiveParams;

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
const RUNTIME: &str = "bedrock-runtime";
const LLAMA3_USER: &str = "<|begin_of_text|><|start_header_id|>user<|end_header_id|>\n\n";
const LLAMA3_ASSISTANT: &str = "<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n\n";

/// Cross-region inference profile prefixes, e.g. `us.anthropic.claude-...`.
const REGION_PREFIXES: &[&str] = &["us", "us-gov", "eu", "apac", "jp", "au", "ca", "global"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Anthropic,
    TitanText,
    Llama,
    Mistral,
    Unsupported,
}

impl ModelFamily {
    pub fn from_model_id(model_id: &str) -> Self {
        let base = strip_region_prefix(model_id);
        if base.starts_with("anthropic.") {
            Self::Anthropic
        } else if base.starts_with("amazon.titan-text") {
            Self::TitanText
        } else if base.starts_with("meta.llama") {
            Self::Llama
        } else if base.starts_with("mistral.") {
            Self::Mistral
        } else {
            Self::Unsupported
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::TitanText => "titan_text",
            Self::Llama => "llama",
            Self::Mistral => "mistral",
            Self::Unsupported => "unsupported",
        }
    }

    pub fn is_supported(self) -> bool {
        self != Self::Unsupported
    }

    pub fn build_request(
        self,
        model_id: &str,
        prompt: &str,
        params: &EffectiveParams,
    ) -> Result<Value> {
        let body = match self {
            Self::Anthropic => serde_json::to_value(AnthropicRequest {
                anthropic_version: ANTHROPIC_VERSION,
                max_tokens: params.max_tokens,
                temperature: params.temperature,
                top_p: params.top_p,
                top_k: params.top_k,
                messages: vec![AnthropicMessage { role: "user", content: prompt }],
            }),
            Self::TitanText => serde_json::to_value(TitanRequest {
                input_text: prompt,
                text_generation_config: TitanConfig {
                    max_token_count: params.max_tokens,
                    temperature: params.temperature,
                    top_p: params.top_p,
                },
            }),
            Self::Llama => serde_json::to_value(LlamaRequest {
                prompt: llama_prompt(model_id, prompt),
                max_gen_len: params.max_tokens,
                temperature: params.temperature,
                top_p: params.top_p,
            }),
            Self::Mistral => serde_json::to_value(MistralRequest {
                prompt: format!("<s>[INST] {prompt} [/INST]"),
                max_tokens: params.max_tokens,
                temperature: params.temperature,
                top_p: params.top_p,
                top_k: params.top_k,
            }),
            Self::Unsupported => {
                return Err(AssistantError::UnsupportedModel(model_id.to_string()));
            }
        };
        body.map_err(|e| AssistantError::service(RUNTIME, format!("encoding request: {e}")))
    }

    /// Extracts the plain reply text from a family-specific response body.
    pub fn parse_response(self, body: Value) -> Result<String> {
        let text = match self {
            Self::Anthropic => {
                let resp: AnthropicResponse = decode(self, body)?;
                let text: String = resp
                    .content
                    .into_iter()
                    .filter(|b| b.kind == "text")
                    .map(|b| b.text)
                    .collect::<Vec<_>>()
                    .join("");
                Some(text)
            }
            Self::TitanText => {
                let resp: TitanResponse = decode(self, body)?;
                resp.results.into_iter().next().map(|r| r.output_text)
            }
            Self::Llama => {
                let resp: LlamaResponse = decode(self, body)?;
                Some(resp.generation)
            }
            Self::Mistral => {
                let resp: MistralResponse = decode(self, body)?;
                resp.outputs.into_iter().next().map(|o| o.text)
            }
            Self::Unsupported => {
                return Err(AssistantError::UnsupportedModel("unknown family".into()));
            }
        };
        text.map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                let detail = format!("{} response carried no text", self.label());
                AssistantError::service(RUNTIME, detail)
            })
    }
}

fn strip_region_prefix(model_id: &str) -> &str {
    match model_id.split_once('.') {
        Some((prefix, rest)) if REGION_PREFIXES.contains(&prefix) => rest,
        _ => model_id,
    }
}

fn llama_prompt(model_id: &str, prompt: &str) -> String {
    if strip_region_prefix(model_id).starts_with("meta.llama2") {
        format!("[INST] {prompt} [/INST]")
    } else {
        format!("{LLAMA3_USER}{prompt}{LLAMA3_ASSISTANT}")
    }
}

fn decode<T: for<'de> Deserialize<'de>>(family: ModelFamily, body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| {
        AssistantError::service(RUNTIME, format!("unexpected {} response: {e}", family.label()))
    })
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    anthropic_version: &'static str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TitanRequest<'a> {
    input_text: &'a str,
    text_generation_config: TitanConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TitanConfig {
    max_token_count: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct TitanResponse {
    results: Vec<TitanResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TitanResult {
    output_text: String,
}

#[derive(Debug, Serialize)]
struct LlamaRequest {
    prompt: String,
    max_gen_len: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct LlamaResponse {
    generation: String,
}

#[derive(Debug, Serialize)]
struct MistralRequest {
    prompt: String,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
struct MistralResponse {
    outputs: Vec<MistralOutput>,
}

#[derive(Debug, Deserialize)]
struct MistralOutput {
    text: String,
}
