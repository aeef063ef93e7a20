use serde::{Deserialize, Serialize};

use crate::error::{AssistantError, Result};

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TOP_P: f32 = 0.9;
pub const DEFAULT_TOP_K: u32 = 250;

const TEMPERATURE_RANGE: (f32, f32) = (0.0, 1.0);
const MAX_TOKENS_RANGE: (u32, u32) = (100, 4000);
const TOP_P_RANGE: (f32, f32) = (0.0, 1.0);
const TOP_K_RANGE: (u32, u32) = (1, 500);

/// Sampling parameters; unset fields fall through to the next layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ModelParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

impl ModelParams {
    pub fn validate(&self) -> Result<()> {
        if let Some(t) = self.temperature {
            check_f32("temperature", t, TEMPERATURE_RANGE)?;
        }
        if let Some(m) = self.max_tokens {
            check_u32("max_tokens", m, MAX_TOKENS_RANGE)?;
        }
        if let Some(p) = self.top_p {
            check_f32("top_p", p, TOP_P_RANGE)?;
        }
        if let Some(k) = self.top_k {
            check_u32("top_k", k, TOP_K_RANGE)?;
        }
        Ok(())
    }

    /// Overlays the set fields of `patch` onto `self`.
    pub fn apply_patch(&mut self, patch: ModelParams) {
        self.temperature = patch.temperature.or(self.temperature);
        self.max_tokens = patch.max_tokens.or(self.max_tokens);
        self.top_p = patch.top_p.or(self.top_p);
        self.top_k = patch.top_k.or(self.top_k);
    }
}

fn check_f32(name: &str, value: f32, (lo, hi): (f32, f32)) -> Result<()> {
    if value.is_nan() || value < lo || value > hi {
        let detail = format!("{name} must be within [{lo}, {hi}], got {value}");
        return Err(AssistantError::validation(detail));
    }
    Ok(())
}

fn check_u32(name: &str, value: u32, (lo, hi): (u32, u32)) -> Result<()> {
    if value < lo || value > hi {
        let detail = format!("{name} must be within [{lo}, {hi}], got {value}");
        return Err(AssistantError::validation(detail));
    }
    Ok(())
}

/// Model choice held by a console.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ModelSettings {
    pub model_id: Option<String>,
    pub params: ModelParams,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GlobalConfigDefaults {
    pub default_model: Option<String>,
    pub model_params: Option<ModelParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RequestOverrides {
    pub model: Option<String>,
    pub model_params: Option<ModelParams>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EffectiveParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for EffectiveParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectiveSettings {
    pub model: Option<String>,
    pub params: EffectiveParams,
}

pub fn resolve_effective_settings(
    global: &GlobalConfigDefaults,
    console: &ModelSettings,
    request: &RequestOverrides,
) -> EffectiveSettings {
    let model = request
        .model
        .clone()
        .or_else(|| console.model_id.clone())
        .or_else(|| global.default_model.clone());

    let params = EffectiveParams {
        temperature: request
            .model_params
            .and_then(|p| p.temperature)
            .or(console.params.temperature)
            .or_else(|| global.model_params.and_then(|p| p.temperature))
            .unwrap_or(DEFAULT_TEMPERATURE),
        max_tokens: request
            .model_params
            .and_then(|p| p.max_tokens)
            .or(console.params.max_tokens)
            .or_else(|| global.model_params.and_then(|p| p.max_tokens))
            .unwrap_or(DEFAULT_MAX_TOKENS),
        top_p: request
            .model_params
            .and_then(|p| p.top_p)
            .or(console.params.top_p)
            .or_else(|| global.model_params.and_then(|p| p.top_p))
            .unwrap_or(DEFAULT_TOP_P),
        top_k: request
            .model_params
            .and_then(|p| p.top_k)
            .or(console.params.top_k)
            .or_else(|| global.model_params.and_then(|p| p.top_k))
            .unwrap_or(DEFAULT_TOP_K),
    };

    EffectiveSettings { model, params }
}
