use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use super::catalog::{CatalogService, ProductWithCategory};
use super::fallback::FallbackResponder;
use crate::config::LlmConfig;
use crate::entities::chat_message;
use crate::errors::ServiceError;

/// Sampling settings sent with every generation request
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationParams {
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl From<&LlmConfig> for GenerationParams {
    fn from(cfg: &LlmConfig) -> Self {
        Self {
            max_output_tokens: cfg.max_output_tokens,
            temperature: cfg.temperature,
        }
    }
}

/// A hosted text-generation model
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generates a completion for `prompt`; the returned text is never empty.
    async fn generate(&self, prompt: &str, params: &GenerationParams)
        -> Result<String, ServiceError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: RequestGenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestGenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Google Generative Language (`generateContent`) client
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    /// Configured model first, then the fallbacks
    models: Vec<String>,
    api_key: String,
}

impl GeminiClient {
    /// `Ok(None)` when no API key is configured.
    pub fn from_config(cfg: &LlmConfig) -> Result<Option<Self>, ServiceError> {
        let Some(api_key) = cfg.api_key() else {
            return Ok(None);
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client: {e}")))?;

        Ok(Some(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            models: std::iter::once(&cfg.model)
                .chain(cfg.fallback_models.iter().filter(|m| **m != cfg.model))
                .cloned()
                .collect(),
            api_key: api_key.to_string(),
        }))
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    /// `Ok(None)` when the API does not know `model`.
    async fn call(
        &self,
        model: &str,
        body: &GenerateContentRequest<'_>,
    ) -> Result<Option<String>, ServiceError> {
        let response = self
            .http
            .post(self.endpoint(model))
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("language model request: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(200).collect();
            return Err(ServiceError::ExternalServiceError(format!(
                "language model returned {status}: {detail}"
            )));
        }

        let payload: GenerateContentResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("malformed language model response: {e}"))
        })?;

        let text: String = payload
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::ExternalServiceError(
                "language model returned no text".to_string(),
            ));
        }
        Ok(Some(text.to_string()))
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    #[instrument(skip(self, prompt, params), fields(model = %self.models[0]))]
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ServiceError> {
        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: RequestGenerationConfig {
                max_output_tokens: params.max_output_tokens,
                temperature: params.temperature,
            },
        };

        for model in &self.models {
            match self.call(model, &body).await? {
                Some(text) => return Ok(text),
                None => warn!(%model, "language model not found, trying next"),
            }
        }
        Err(ServiceError::ExternalServiceError(format!(
            "none of the configured models is available: {}",
            self.models.join(", ")
        )))
    }
}

/// Store data embedded into each prompt
#[derive(Clone, Debug, Default)]
pub struct StoreSnapshot {
    pub categories: Vec<String>,
    pub products: Vec<ProductWithCategory>,
}

/// Prompt for a chat answer: store snapshot, recent conversation and the question.
pub fn build_chat_prompt(
    snapshot: &StoreSnapshot,
    history: &[chat_message::Model],
    message: &str,
) -> Result<String, ServiceError> {
    let products = serde_json::to_string(&snapshot.products)?;
    let categories = serde_json::to_string(&snapshot.categories)?;

    let mut conversation = String::new();
    for exchange in history {
        conversation.push_str(&format!(
            "- Usuario: {}\n- Asistente: {}\n",
            exchange.user_message, exchange.bot_response
        ));
    }
    if conversation.is_empty() {
        conversation.push_str("(sin mensajes previos)\n");
    }

    Ok(format!(
        "Eres un asistente virtual especializado en e-commerce. Responde ÚNICAMENTE en español.\n\n\
         INFORMACIÓN ACTUAL DE LA TIENDA:\n\
         - Productos disponibles: {count}\n\
         - Categorías: {categories}\n\
         - Datos de productos: {products}\n\n\
         CONVERSACIÓN RECIENTE:\n{conversation}\n\
         CONTEXTO DE USUARIO:\n\
         - El usuario está en una tienda online real\n\
         - Puedes acceder a información actualizada de productos, precios y stock\n\
         - Debes ser útil, preciso y amable\n\n\
         PREGUNTA DEL USUARIO: \"{message}\"\n\n\
         Responde de manera:\n\
         - Útil y específica basándote en los datos reales de la tienda\n\
         - En español claro y natural\n\
         - Incluye información relevante de productos si aplica\n\
         - Ofrece seguir ayudando\n\n\
         RESPUESTA:",
        count = snapshot.products.len(),
    ))
}

/// Answers free-form questions with the language model, degrading to the
/// rule-based responder on any failure
#[derive(Clone)]
pub struct LlmGateway {
    model: Option<Arc<dyn LanguageModel>>,
    catalog: CatalogService,
    fallback: FallbackResponder,
    params: GenerationParams,
}

impl LlmGateway {
    pub fn new(
        model: Option<Arc<dyn LanguageModel>>,
        catalog: CatalogService,
        fallback: FallbackResponder,
        params: GenerationParams,
    ) -> Self {
        Self {
            model,
            catalog,
            fallback,
            params,
        }
    }

    async fn snapshot(&self) -> Result<StoreSnapshot, ServiceError> {
        Ok(StoreSnapshot {
            categories: self
                .catalog
                .categories()
                .await?
                .into_iter()
                .map(|c| c.name)
                .collect(),
            products: self.catalog.products_with_categories(false).await?,
        })
    }

    async fn ask(
        &self,
        model: &dyn LanguageModel,
        history: &[chat_message::Model],
        message: &str,
    ) -> Result<String, ServiceError> {
        let snapshot = self.snapshot().await?;
        let prompt = build_chat_prompt(&snapshot, history, message)?;
        model.generate(&prompt, &self.params).await
    }

    /// Never fails: model errors are logged and answered by the fallback responder.
    #[instrument(skip_all)]
    pub async fn respond(&self, message: &str, history: &[chat_message::Model]) -> String {
        let Some(model) = self.model.as_deref() else {
            return self.fallback.respond(message).await;
        };

        match self.ask(model, history, message).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "language model unavailable, using fallback responder");
                counter!("assistant.llm_fallbacks", 1);
                self.fallback.respond(message).await
            }
        }
    }
}
