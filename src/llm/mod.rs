//! LLM-backed assistant client.
//!
//! Consumed strictly as a text-generation service: one prompt in, one text
//! response out, against an Ollama-style local endpoint. Any JSON-shaped
//! content inside a response is untrusted text; callers validate it
//! themselves.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ScrapeError};
use crate::repository::StoredProcess;

/// Configuration for the assistant client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Whether the assistant is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Ollama API endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model used for generation.
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tokens in a response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature for generation (0.0 - 1.0).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_enabled() -> bool {
    true
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3:8b".to_string()
}

fn default_max_tokens() -> u32 {
    512
}

fn default_temperature() -> f32 {
    0.3
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Assistant client over a local text-generation endpoint.
pub struct LlmClient {
    config: LlmConfig,
    client: Client,
}

impl LlmClient {
    /// Create a new client with the given configuration.
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300)) // slow local models
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Check if the generation service is reachable.
    pub async fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let url = format!("{}/api/tags", self.config.endpoint);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Generate a completion for a prompt.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        if !self.config.enabled {
            return Err(ScrapeError::Llm("assistant is disabled".into()));
        }

        let url = format!("{}/api/generate", self.config.endpoint);
        let request = OllamaRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        debug!("sending {} char prompt to {}", prompt.len(), self.config.model);
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ScrapeError::Llm(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ScrapeError::Llm(format!("HTTP {}", resp.status())));
        }

        let body: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| ScrapeError::Llm(e.to_string()))?;
        Ok(body.response.trim().to_string())
    }
}

/// Build an assistant prompt answering a question over stored tenders.
pub fn tender_question_prompt(question: &str, processes: &[StoredProcess]) -> String {
    let mut context = String::new();
    for p in processes {
        let value = p
            .reference_value
            .map(|v| format!("{} {:.2}", p.currency, v))
            .unwrap_or_else(|| "sin valor referencial".to_string());
        context.push_str(&format!(
            "- {} | {} | {} | {} | {}\n",
            p.process_number,
            p.entity,
            p.description,
            p.category.map(|c| c.as_str()).unwrap_or("Sin categoría"),
            value,
        ));
    }

    format!(
        "Eres un asistente para proveedores de tecnología que monitorean \
         licitaciones públicas. Responde la pregunta usando solo los procesos \
         listados; si la respuesta no está en los datos, dilo.\n\n\
         Procesos:\n{context}\nPregunta: {question}\n\nRespuesta:"
    )
}
