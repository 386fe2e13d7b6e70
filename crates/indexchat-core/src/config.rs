//! IndexChat configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IndexChatError, Result};
use crate::types::Modality;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IndexChatConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl IndexChatConfig {
    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| IndexChatError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| IndexChatError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| IndexChatError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the IndexChat home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".indexchat")
    }

    /// Reject values the retriever or the answer loop cannot work with.
    pub fn validate(&self) -> Result<()> {
        for modality in Modality::ALL {
            if self.embeddings.for_modality(modality).dimensions == 0 {
                return Err(IndexChatError::Config(format!(
                    "embeddings.{modality}.dimensions must be greater than zero"
                )));
            }
        }
        if self.agent.max_tool_rounds == 0 {
            return Err(IndexChatError::Config(
                "agent.max_tool_rounds must be at least 1".into(),
            ));
        }
        if self.index.default_top_k == 0 || self.index.default_top_k > self.index.max_top_k {
            return Err(IndexChatError::Config(format!(
                "index.default_top_k must be between 1 and index.max_top_k ({})",
                self.index.max_top_k
            )));
        }
        Ok(())
    }
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

/// Generative model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_llm_provider() -> String { "openai".into() }
fn default_llm_model() -> String { "gpt-4o-mini".into() }
fn default_temperature() -> f32 { 0.2 }
fn default_max_tokens() -> u32 { 1024 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_key: String::new(),
            endpoint: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Per-modality query embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_text_embedding")]
    pub text: EmbeddingModelConfig,
    #[serde(default = "default_image_embedding")]
    pub image: EmbeddingModelConfig,
    #[serde(default = "default_audio_embedding")]
    pub audio: EmbeddingModelConfig,
}

impl EmbeddingsConfig {
    pub fn for_modality(&self, modality: Modality) -> &EmbeddingModelConfig {
        match modality {
            Modality::Text => &self.text,
            Modality::Image => &self.image,
            Modality::Audio => &self.audio,
        }
    }
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            text: default_text_embedding(),
            image: default_image_embedding(),
            audio: default_audio_embedding(),
        }
    }
}

/// One embedding model. `provider = "none"` disables the modality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingModelConfig {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub endpoint: String,
}

impl EmbeddingModelConfig {
    pub fn is_disabled(&self) -> bool {
        self.provider.is_empty() || self.provider == "none"
    }
}

fn default_text_embedding() -> EmbeddingModelConfig {
    EmbeddingModelConfig {
        provider: "openai".into(),
        model: "text-embedding-3-large".into(),
        dimensions: 3072,
        api_key: String::new(),
        endpoint: String::new(),
    }
}

fn default_image_embedding() -> EmbeddingModelConfig {
    EmbeddingModelConfig {
        provider: "huggingface".into(),
        model: "openai/clip-vit-base-patch32".into(),
        dimensions: 512,
        api_key: String::new(),
        endpoint: String::new(),
    }
}

fn default_audio_embedding() -> EmbeddingModelConfig {
    EmbeddingModelConfig {
        provider: "huggingface".into(),
        model: "laion/clap-htsat-unfused".into(),
        dimensions: 512,
        api_key: String::new(),
        endpoint: String::new(),
    }
}

/// Chunk store and search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// sqlite-vss shared libraries (`vector0`, then `vss0`) loaded on each
    /// read connection. Empty disables the indexed path.
    #[serde(default)]
    pub vss_extensions: Vec<String>,
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
}

fn default_db_path() -> String { "~/.indexchat/database.sqlite".into() }
fn default_top_k() -> usize { 5 }
fn default_max_top_k() -> usize { 20 }

impl IndexConfig {
    pub fn db_path(&self) -> PathBuf {
        expand_path(&self.db_path)
    }

    pub fn vss_extension_paths(&self) -> Vec<PathBuf> {
        self.vss_extensions.iter().map(|p| expand_path(p)).collect()
    }

    /// Effective `top_k` for a caller-supplied value under this config.
    pub fn top_k(&self, requested: Option<f64>) -> usize {
        Self::clamp_top_k(requested, self.default_top_k, self.max_top_k)
    }

    /// Round a requested `top_k` and clamp it to `1..=max`. Fractional,
    /// negative and oversized values are clamped, not rejected.
    pub fn clamp_top_k(requested: Option<f64>, default: usize, max: usize) -> usize {
        let max = max.max(1);
        match requested.filter(|k| k.is_finite()) {
            Some(k) if k < 1.0 => 1,
            // `as` saturates, so oversized requests land on `max`.
            Some(k) => (k.round() as usize).clamp(1, max),
            None => default.clamp(1, max),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            vss_extensions: vec![],
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
        }
    }
}

/// Answer loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    #[serde(default = "default_max_tool_output_chars")]
    pub max_tool_output_chars: usize,
}

fn default_system_prompt() -> String {
    "You are IndexChat, an assistant that answers questions about the user's own files \
     (documents, images, audio recordings and video). Use the search_pdfs tool to look up \
     relevant fragments before answering. Cite the file names you relied on. If the \
     search returns nothing relevant, say so instead of guessing."
        .into()
}
fn default_max_tool_rounds() -> usize { 5 }
fn default_max_tool_output_chars() -> usize { 4000 }

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_tool_rounds: default_max_tool_rounds(),
            max_tool_output_chars: default_max_tool_output_chars(),
        }
    }
}

/// Shared provider call limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_hf_max_retries")]
    pub hf_max_retries: u32,
}

fn default_timeout_secs() -> u64 { 30 }
fn default_hf_max_retries() -> u32 { 3 }

impl ProvidersConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            hf_max_retries: default_hf_max_retries(),
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 { 3000 }
fn default_host() -> String { "127.0.0.1".into() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}
