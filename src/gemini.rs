//! Gemini API clients
//!
//! [`GeminiClient`] generates text and [`GeminiEmbedding`] produces embeddings.
//! Both use a long-lived reqwest::Client for connection pooling.

use crate::embedding::EmbeddingModel;
use crate::error::MemoryError;
use crate::llm::{ChatMessage, TextGenerator};
use crate::memory::MemoryRole;
use crate::Result;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Output size of `text-embedding-004`
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

fn build_http_client() -> Result<Client> {
    Ok(Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(8)
        .build()?)
}

fn require_key(api_key: &str) -> Result<()> {
    if api_key.is_empty() {
        return Err(MemoryError::Config("GEMINI_API_KEY not configured".to_string()));
    }
    Ok(())
}

/// Reusable Gemini text generator (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    fn url(&self) -> String {
        format!("{}/{}:generateContent?key={}", BASE_URL, self.model, self.api_key)
    }
}

/// Gemini only knows "user" and "model" turns
fn gemini_role(role: &MemoryRole) -> &'static str {
    match role {
        MemoryRole::Assistant => "model",
        _ => "user",
    }
}

/// System turns become the system instruction; the rest become contents.
fn build_request(messages: &[ChatMessage], max_tokens: u32) -> GenerateRequest {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for message in messages {
        match &message.role {
            MemoryRole::System => system_parts.push(Part {
                text: message.content.clone(),
            }),
            role => contents.push(Content {
                role: Some(gemini_role(role).to_string()),
                parts: vec![Part {
                    text: message.content.clone(),
                }],
            }),
        }
    }

    GenerateRequest {
        contents,
        generation_config: GenerationConfig {
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: max_tokens,
        },
        system_instruction: if system_parts.is_empty() {
            None
        } else {
            Some(Content {
                role: None,
                parts: system_parts,
            })
        },
    }
}

#[async_trait::async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String> {
        require_key(&self.api_key)?;

        let request = build_request(messages, max_tokens);

        info!(model = %self.model, turns = messages.len(), "Calling Gemini generateContent");

        let response = self
            .client
            .post(self.url())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                MemoryError::Generation(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(MemoryError::Generation(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        let gemini_response: GenerateResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            MemoryError::Generation(format!("Gemini parse error: {}", e))
        })?;

        let candidate = gemini_response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::Generation("No response from Gemini API".to_string()))?;

        if let Some(reason) = candidate.finish_reason.as_deref() {
            info!(finish_reason = reason, "Gemini response received");
        }

        candidate
            .content
            .parts
            .into_iter()
            .next()
            .map(|part| part.text)
            .ok_or_else(|| MemoryError::Generation("Empty response from Gemini".to_string()))
    }
}

/// Gemini embedding client
pub struct GeminiEmbedding {
    client: Client,
    api_key: String,
    model: String,
    dimension: usize,
}

impl GeminiEmbedding {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            api_key: api_key.into(),
            model: model.into(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
        })
    }

    /// Override the reported dimension for models other than `text-embedding-004`
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    fn embed_request(&self, text: &str) -> EmbedRequest {
        EmbedRequest {
            model: format!("models/{}", self.model),
            content: Content {
                role: None,
                parts: vec![Part {
                    text: text.to_string(),
                }],
            },
        }
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<R> {
        require_key(&self.api_key)?;

        let url = format!("{}/{}:{}?key={}", BASE_URL, self.model, method, self.api_key);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini embedding request failed: {}", e);
                MemoryError::Embedding(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini embedding error response: {}", error_text);
            return Err(MemoryError::Embedding(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MemoryError::Embedding(format!("Gemini parse error: {}", e)))
    }
}

#[async_trait::async_trait]
impl EmbeddingModel for GeminiEmbedding {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let response: EmbedResponse = self.post("embedContent", &self.embed_request(text)).await?;
        Ok(response.embedding.values)
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = BatchEmbedRequest {
            requests: texts.iter().map(|text| self.embed_request(text)).collect(),
        };
        let response: BatchEmbedResponse = self.post("batchEmbedContents", &request).await?;

        if response.embeddings.len() != texts.len() {
            return Err(MemoryError::Embedding(format!(
                "Gemini returned {} embeddings for {} texts",
                response.embeddings.len(),
                texts.len()
            )));
        }

        Ok(response
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Content,
    finish_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let messages = vec![
            ChatMessage::system("Summarize the conversation"),
            ChatMessage::user("user: what is a vector store?"),
            ChatMessage::new(MemoryRole::Assistant, "an index over embeddings"),
        ];

        let json = serde_json::to_value(build_request(&messages, 500)).unwrap();
        assert_eq!(json["system_instruction"]["parts"][0]["text"], "Summarize the conversation");
        assert!(json["system_instruction"].get("role").is_none());
        assert_eq!(json["contents"].as_array().unwrap().len(), 2);
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["generation_config"]["max_output_tokens"], 500);
    }

    #[test]
    fn test_no_system_instruction_without_system_turns() {
        let json = serde_json::to_value(build_request(&[ChatMessage::user("hi")], 64)).unwrap();
        assert!(json.get("system_instruction").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "A short summary." }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 12 }
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.candidates[0].content.parts[0].text, "A short summary.");
        assert_eq!(parsed.candidates[0].finish_reason.as_deref(), Some("STOP"));

        let raw = r#"{ "embeddings": [{ "values": [0.1, 0.2] }, { "values": [0.3, 0.4] }] }"#;
        let parsed: BatchEmbedResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.embeddings[1].values, vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = GeminiClient::new("", "gemini-2.0-flash").unwrap();
        let err = client.generate(&[ChatMessage::user("hi")], 16).await.unwrap_err();
        assert!(err.to_string().to_lowercase().contains("api_key"));

        let embedder = GeminiEmbedding::new("", "text-embedding-004").unwrap();
        assert!(embedder.embed_query("hi").await.is_err());
        assert_eq!(embedder.dimension(), DEFAULT_EMBEDDING_DIMENSION);
    }
}
