//! Reply generation
//!
//! The port never fails: every backend problem collapses into
//! [`REPLY_FALLBACK`] after being logged.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{DEFAULT_REQUEST_TIMEOUT, http_client};
use crate::prompt::ClerkPersona;

/// Spoken when no reply could be produced
pub const REPLY_FALLBACK: &str = "Lo siento, no pude responder en este momento.";

/// Generative Language API root
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default Gemini model
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Produces the clerk's answer to a customer utterance
#[async_trait]
pub trait ReplyGenerationPort: Send + Sync {
    /// Reply to `user_text` in `language`
    ///
    /// Infallible by contract; implementations return [`REPLY_FALLBACK`]
    /// instead of an error.
    async fn generate_reply(&self, user_text: &str, language: &str) -> String;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Why a Gemini call produced nothing usable
#[derive(Debug, thiserror::Error)]
enum ReplyError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Gemini API error {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("unparseable response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("prompt blocked: {0}")]
    Blocked(String),

    #[error("response carried no text")]
    Empty,
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Extract `candidates[0].content.parts[0].text` from a Gemini response body
fn parse_gemini_response(body: &str) -> Result<String, ReplyError> {
    let response: GenerateContentResponse = serde_json::from_str(body)?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ReplyError::Blocked(reason));
    }

    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(ReplyError::Empty)?;

    Ok(text)
}

/// Gemini `generateContent` client
pub struct GeminiReplyGenerator {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    persona: ClerkPersona,
}

impl GeminiReplyGenerator {
    /// Create a Gemini client
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API key is empty
    pub fn new(api_key: SecretString, model: String) -> crate::Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(crate::Error::Config(
                "Gemini API key required for reply generation".to_string(),
            ));
        }

        Ok(Self {
            client: http_client(DEFAULT_REQUEST_TIMEOUT),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            model,
            persona: ClerkPersona::default(),
        })
    }

    /// Limit each request to `timeout`
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    /// Override the API root
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Replace the clerk persona
    #[must_use]
    pub fn persona(mut self, persona: ClerkPersona) -> Self {
        self.persona = persona;
        self
    }

    async fn request_reply(&self, user_text: &str) -> Result<String, ReplyError> {
        let prompt = self.persona.build_prompt(user_text);
        let request = GenerateContentRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: &prompt }],
            }],
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ReplyError::Status { status, body });
        }

        parse_gemini_response(&body)
    }
}

#[async_trait]
impl ReplyGenerationPort for GeminiReplyGenerator {
    async fn generate_reply(&self, user_text: &str, language: &str) -> String {
        tracing::debug!(model = %self.model, language, "requesting reply");

        match self.request_reply(user_text).await {
            Ok(reply) => {
                tracing::info!(reply = %reply, "reply generated");
                reply
            }
            Err(e @ (ReplyError::Blocked(_) | ReplyError::Empty)) => {
                tracing::warn!(error = %e, "Gemini returned no reply");
                REPLY_FALLBACK.to_string()
            }
            Err(e) => {
                tracing::error!(error = %e, "Gemini reply failed");
                REPLY_FALLBACK.to_string()
            }
        }
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Keyword rule: any keyword hit yields `answer`
struct Rule {
    keywords: &'static [&'static str],
    answer: &'static str,
}

/// Checked in order; first hit wins
const RULES: &[Rule] = &[
    Rule {
        keywords: &["precio", "cuánto cuesta", "cuanto cuesta", "cuánto vale", "cuanto vale"],
        answer: "Apunte al producto y le diré el precio.",
    },
    Rule {
        keywords: &["pagar", "caja", "cajas"],
        answer: "Las cajas están al frente de la tienda. La caja 3 tiene menos fila.",
    },
    Rule {
        keywords: &["oferta", "ofertas", "descuento"],
        answer: "Hoy tenemos ofertas en frutas, veinte por ciento descuento en carnes, y dos por uno en lácteos.",
    },
    Rule {
        keywords: &["fruta", "manzana", "plátano", "platano", "naranja"],
        answer: "Las frutas están en la entrada principal. Le muestro el camino.",
    },
    Rule {
        keywords: &["verdura", "tomate", "cebolla", "lechuga"],
        answer: "Las verduras están en la entrada principal, junto a las frutas.",
    },
    Rule {
        keywords: &["pan"],
        answer: "El pan está en la panadería, pasillo 1.",
    },
    Rule {
        keywords: &["arroz", "pasta"],
        answer: "El arroz y la pasta están en cereales, pasillo 2.",
    },
    Rule {
        keywords: &["agua", "cerveza", "refresco"],
        answer: "Las bebidas están en el pasillo 4.",
    },
    Rule {
        keywords: &["vino"],
        answer: "Los vinos están en el pasillo 5.",
    },
    Rule {
        keywords: &["café", "cafe"],
        answer: "El café está en el pasillo 2.",
    },
    Rule {
        keywords: &["azúcar", "azucar"],
        answer: "El azúcar está en endulzantes, pasillo 2.",
    },
    Rule {
        keywords: &["sal"],
        answer: "La sal está en condimentos, pasillo 2.",
    },
    Rule {
        keywords: &["leche", "queso", "yogur"],
        answer: "La leche y los lácteos están en la sección de lácteos.",
    },
    Rule {
        keywords: &["carne", "pollo"],
        answer: "La carne está en la carnicería.",
    },
    Rule {
        keywords: &["gracias"],
        answer: "¡De nada! Que tenga un buen día.",
    },
    Rule {
        keywords: &["adiós", "adios", "hasta luego"],
        answer: "¡Hasta luego! Gracias por visitarnos.",
    },
    Rule {
        keywords: &["hola", "buenos", "buenas"],
        answer: "¡Hola! Bienvenido a nuestro supermercado. ¿En qué puedo ayudarle?",
    },
];

/// Answer when no keyword matches
pub const OFFLINE_DEFAULT_REPLY: &str = "Lo siento, no entendí bien. ¿Qué producto está buscando?";

/// Single-word keywords also match a simple plural (`manzanas`, `panes`)
fn token_matches(token: &str, keyword: &str) -> bool {
    token == keyword
        || token.strip_suffix('s') == Some(keyword)
        || token.strip_suffix("es") == Some(keyword)
}

/// Canned keyword clerk for running without credentials
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineReplyGenerator;

impl OfflineReplyGenerator {
    /// Look up the canned answer for `user_text`
    #[must_use]
    pub fn answer(user_text: &str) -> &'static str {
        let lower = user_text.to_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        RULES
            .iter()
            .find(|rule| {
                rule.keywords.iter().any(|kw| {
                    let parts: Vec<&str> = kw.split(' ').collect();
                    if let [single] = parts.as_slice() {
                        tokens.iter().any(|t| token_matches(t, single))
                    } else {
                        tokens.windows(parts.len()).any(|w| w == parts.as_slice())
                    }
                })
            })
            .map_or(OFFLINE_DEFAULT_REPLY, |rule| rule.answer)
    }
}

#[async_trait]
impl ReplyGenerationPort for OfflineReplyGenerator {
    async fn generate_reply(&self, user_text: &str, _language: &str) -> String {
        Self::answer(user_text).to_string()
    }

    fn name(&self) -> &'static str {
        "offline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_candidate_text() {
        let body = r#"{
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "  Las manzanas están en frutas. \n"}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }"#;
        assert_eq!(parse_gemini_response(body).unwrap(), "Las manzanas están en frutas.");
    }

    #[test]
    fn missing_candidates_is_empty() {
        assert!(matches!(parse_gemini_response(r#"{"candidates": []}"#), Err(ReplyError::Empty)));
        assert!(matches!(parse_gemini_response("{}"), Err(ReplyError::Empty)));
        assert!(matches!(
            parse_gemini_response(r#"{"candidates": [{"content": {"parts": [{"text": "   "}]}}]}"#),
            Err(ReplyError::Empty)
        ));
        assert!(matches!(
            parse_gemini_response(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#),
            Err(ReplyError::Empty)
        ));
    }

    #[test]
    fn block_reason_is_reported() {
        let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        assert!(matches!(parse_gemini_response(body), Err(ReplyError::Blocked(r)) if r == "SAFETY"));
    }

    #[test]
    fn malformed_body_is_parse_error() {
        assert!(matches!(parse_gemini_response("<html>"), Err(ReplyError::Parse(_))));
    }

    #[test]
    fn empty_key_is_config_error() {
        let result = GeminiReplyGenerator::new(SecretString::from(String::new()), DEFAULT_GEMINI_MODEL.to_string());
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }

    #[tokio::test]
    async fn unreachable_backend_falls_back() {
        let generator = GeminiReplyGenerator::new(SecretString::from("k".to_string()), DEFAULT_GEMINI_MODEL.to_string())
            .unwrap()
            .base_url("http://127.0.0.1:9");

        assert_eq!(generator.generate_reply("hola", "es-ES").await, REPLY_FALLBACK);
    }

    #[tokio::test]
    async fn silent_backend_times_out_to_fallback() {
        let url = crate::voice::test_support::silent_server().await;
        let generator = GeminiReplyGenerator::new(SecretString::from("k".to_string()), DEFAULT_GEMINI_MODEL.to_string())
            .unwrap()
            .base_url(url)
            .request_timeout(Duration::from_millis(200));

        let reply = tokio::time::timeout(Duration::from_secs(5), generator.generate_reply("hola", "es-ES"))
            .await
            .expect("request timeout did not fire");
        assert_eq!(reply, REPLY_FALLBACK);
    }

    #[test]
    fn offline_clerk_answers() {
        let cases = [
            ("Hola, ¿dónde están las manzanas?", "Las frutas están en la entrada principal. Le muestro el camino."),
            ("¿Cuánto cuesta el pan?", "Apunte al producto y le diré el precio."),
            ("Busco el pan", "El pan está en la panadería, pasillo 1."),
            ("¿Dónde puedo pagar?", "Las cajas están al frente de la tienda. La caja 3 tiene menos fila."),
            ("Muchas gracias", "¡De nada! Que tenga un buen día."),
            ("Hola", "¡Hola! Bienvenido a nuestro supermercado. ¿En qué puedo ayudarle?"),
            ("Necesito sal", "La sal está en condimentos, pasillo 2."),
            ("¿Dónde está la salida?", OFFLINE_DEFAULT_REPLY),
            ("", OFFLINE_DEFAULT_REPLY),
        ];

        for (input, expected) in cases {
            assert_eq!(OfflineReplyGenerator::answer(input), expected, "{input:?}");
        }
    }
}
