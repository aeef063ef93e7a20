use anyhow::Context;
use url::Url;

use crate::prompt::DEFAULT_MAX_INPUT_CHARS;
use crate::settings::GlobalConfigDefaults;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_MODEL: &str = "anthropic.claude-3-haiku-20240307-v1:0";
const DEFAULT_EXCLUDED_MODELS: &[&str] = &["embed", "rerank", "image"];

/// Process-wide configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub region: String,
    pub bedrock_endpoint: Option<Url>,
    pub bedrock_runtime_endpoint: Option<Url>,
    pub bedrock_api_key: Option<String>,
    pub eks_endpoint: Option<Url>,
    pub eks_token: Option<String>,
    pub max_input_chars: usize,
    pub excluded_models: Vec<String>,
    pub defaults: GlobalConfigDefaults,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.into(),
            bedrock_endpoint: None,
            bedrock_runtime_endpoint: None,
            bedrock_api_key: None,
            eks_endpoint: None,
            eks_token: None,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            excluded_models: DEFAULT_EXCLUDED_MODELS.iter().map(|s| s.to_string()).collect(),
            defaults: GlobalConfigDefaults {
                default_model: Some(DEFAULT_MODEL.into()),
                model_params: None,
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let parse_url = |key: &str| -> anyhow::Result<Option<Url>> {
            get(key)
                .map(|v| Url::parse(&v).with_context(|| format!("{key} is not a valid URL: {v}")))
                .transpose()
        };

        let mut config = Self::default();
        if let Some(region) = get("AWS_REGION").or_else(|| get("AWS_DEFAULT_REGION")) {
            config.region = region;
        }
        config.bedrock_endpoint = parse_url("BEDROCK_ENDPOINT")?;
        config.bedrock_runtime_endpoint = parse_url("BEDROCK_RUNTIME_ENDPOINT")?;
        config.bedrock_api_key = get("AWS_BEARER_TOKEN_BEDROCK");
        config.eks_endpoint = parse_url("EKS_ENDPOINT")?;
        config.eks_token = get("EKS_BEARER_TOKEN");
        if let Some(model) = get("ASSISTANT_DEFAULT_MODEL") {
            config.defaults.default_model = Some(model);
        }
        if let Some(max) = get("ASSISTANT_MAX_INPUT_CHARS") {
            config.max_input_chars = max.parse().with_context(|| {
                format!("ASSISTANT_MAX_INPUT_CHARS must be a positive integer, got {max}")
            })?;
        }
        if let Some(list) = get("ASSISTANT_EXCLUDED_MODELS") {
            config.excluded_models = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        anyhow::ensure!(
            config.max_input_chars > 0,
            "ASSISTANT_MAX_INPUT_CHARS must be greater than zero"
        );
        Ok(config)
    }

    pub fn bedrock_url(&self) -> anyhow::Result<Url> {
        self.regional(&self.bedrock_endpoint, "bedrock")
    }

    pub fn bedrock_runtime_url(&self) -> anyhow::Result<Url> {
        self.regional(&self.bedrock_runtime_endpoint, "bedrock-runtime")
    }

    pub fn eks_url(&self) -> anyhow::Result<Url> {
        self.regional(&self.eks_endpoint, "eks")
    }

    /// An explicit EKS endpoint is assumed to sign requests itself.
    pub fn eks_proxied(&self) -> bool {
        self.eks_endpoint.is_some()
    }

    fn regional(&self, explicit: &Option<Url>, service: &str) -> anyhow::Result<Url> {
        match explicit {
            Some(url) => Ok(url.clone()),
            None => {
                let raw = format!("https://{service}.{}.amazonaws.com", self.region);
                Url::parse(&raw).with_context(|| format!("invalid region {}", self.region))
            }
        }
    }
}
