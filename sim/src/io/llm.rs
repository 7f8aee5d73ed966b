//! Chat-completion clients for the configured provider.
//!
//! [`LlmClient`] decouples the simulation loop from the HTTP backend. The
//! request/response shapes of each provider are pure functions so they can be
//! tested without a network.

use std::cell::Cell;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::text::clip;
use crate::io::config::LlmConfig;

pub const OPENAI_COMPATIBLE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
pub const GEMINI_ROOT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
const ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Any OpenAI-compatible chat completions endpoint.
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Gemini,
    /// Deterministic canned replies; no network.
    Offline,
}

#[derive(Debug, Error)]
#[error("unknown provider '{0}' (expected openai, anthropic, gemini or offline)")]
pub struct ParseProviderError(String);

impl FromStr for Provider {
    type Err = ParseProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "gemini" => Ok(Provider::Gemini),
            "offline" => Ok(Provider::Offline),
            other => Err(ParseProviderError(other.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Gemini => "gemini",
            Provider::Offline => "offline",
        };
        f.write_str(name)
    }
}

impl Provider {
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o-mini",
            Provider::Anthropic => "claude-3-haiku-20240307",
            Provider::Gemini => "gemini-2.0-flash-lite",
            Provider::Offline => "offline",
        }
    }
}

/// Which side of the conversation a request speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Voice {
    Member,
    Elyx,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub voice: Voice,
    pub system: String,
    pub developer: String,
    pub user: String,
    pub max_tokens: u32,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing API key: set {env}")]
    MissingApiKey { env: String },
    /// Built with the request URL stripped.
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response shape: {0}")]
    Malformed(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Transport(err.without_url())
    }
}

/// Abstraction over chat-completion backends.
pub trait LlmClient {
    /// Return the model's reply text for `request`.
    fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

impl<C: LlmClient + ?Sized> LlmClient for Box<C> {
    fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        (**self).complete(request)
    }
}

/// Endpoint for `provider`. An explicit `base_url` wins.
pub fn endpoint(provider: Provider, base_url: &str, model: &str) -> String {
    let base_url = base_url.trim();
    if !base_url.is_empty() {
        return base_url.to_string();
    }
    match provider {
        Provider::OpenAi | Provider::Offline => OPENAI_COMPATIBLE_URL.to_string(),
        Provider::Anthropic => ANTHROPIC_URL.to_string(),
        Provider::Gemini => format!("{GEMINI_ROOT}/{model}:generateContent"),
    }
}

/// JSON body for one request.
pub fn build_body(provider: Provider, model: &str, request: &ChatRequest, temperature: f32) -> Value {
    match provider {
        Provider::OpenAi | Provider::Offline => {
            let mut messages = Vec::new();
            for prompt in [&request.system, &request.developer] {
                if !prompt.trim().is_empty() {
                    messages.push(json!({ "role": "system", "content": prompt }));
                }
            }
            messages.push(json!({ "role": "user", "content": request.user }));
            json!({
                "model": model,
                "messages": messages,
                "temperature": temperature,
                "max_tokens": request.max_tokens,
            })
        }
        Provider::Anthropic => {
            let system = [&request.system, &request.developer]
                .into_iter()
                .filter(|p| !p.trim().is_empty())
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("\n\n");
            json!({
                "model": model,
                "max_tokens": request.max_tokens,
                "system": system,
                "messages": [{ "role": "user", "content": request.user }],
                "temperature": temperature,
            })
        }
        Provider::Gemini => {
            let mut parts = Vec::new();
            if !request.system.trim().is_empty() {
                parts.push(format!("[SYSTEM]\n{}", request.system));
            }
            if !request.developer.trim().is_empty() {
                parts.push(format!("[DEVELOPER]\n{}", request.developer));
            }
            parts.push(request.user.clone());
            json!({
                "contents": [{ "parts": [{ "text": parts.join("\n\n") }] }],
                "generationConfig": {
                    "temperature": temperature,
                    "maxOutputTokens": request.max_tokens,
                },
            })
        }
    }
}

/// Pull the reply text out of a provider response.
pub fn extract_text(provider: Provider, response: &Value) -> Result<String, LlmError> {
    let text = match provider {
        Provider::OpenAi | Provider::Offline => {
            let choice = &response["choices"][0];
            choice["message"]["content"]
                .as_str()
                .or_else(|| choice["text"].as_str())
        }
        Provider::Anthropic => response["content"][0]["text"].as_str(),
        Provider::Gemini => response["candidates"][0]["content"]["parts"][0]["text"].as_str(),
    };
    text.map(|t| t.trim().to_string())
        .ok_or_else(|| LlmError::Malformed(clip(&response.to_string(), ERROR_BODY_CHARS)))
}

/// Blocking HTTP client for one provider.
pub struct HttpLlmClient {
    provider: Provider,
    model: String,
    endpoint: String,
    api_key: String,
    temperature: f32,
    http: reqwest::blocking::Client,
}

impl HttpLlmClient {
    /// Build from config; `api_key` is the value of `cfg.api_key_env`.
    pub fn from_config(cfg: &LlmConfig, api_key: Option<String>) -> Result<Self, LlmError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey {
                env: cfg.api_key_env.clone(),
            })?;
        let model = if cfg.model.trim().is_empty() {
            cfg.provider.default_model().to_string()
        } else {
            cfg.model.trim().to_string()
        };
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            provider: cfg.provider,
            endpoint: endpoint(cfg.provider, &cfg.base_url, &model),
            model,
            api_key,
            temperature: cfg.temperature,
            http,
        })
    }
}

impl LlmClient for HttpLlmClient {
    #[instrument(skip_all, fields(provider = %self.provider, model = %self.model, voice = ?request.voice))]
    fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let body = build_body(self.provider, &self.model, request, self.temperature);
        let mut builder = self.http.post(&self.endpoint).json(&body);
        builder = match self.provider {
            Provider::OpenAi | Provider::Offline => builder.bearer_auth(&self.api_key),
            Provider::Anthropic => builder
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            Provider::Gemini => builder.header("x-goog-api-key", &self.api_key),
        };

        let response = builder.send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(status = status.as_u16(), "provider returned error status");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: clip(&body, ERROR_BODY_CHARS),
            });
        }
        let json: Value = response.json()?;
        let text = extract_text(self.provider, &json)?;
        debug!(chars = text.len(), "completion received");
        Ok(text)
    }
}

const OFFLINE_MEMBER_REPLIES: [&str; 5] = [
    "Hi Ruby, managed three walks this week. Thanks for the nudges!",
    "Flight to Jakarta on Tuesday, can we keep things light while I'm away?",
    "Is magnesium worth taking for sleep, or is that a myth?",
    "Missed two sessions because of a deadline. Any shorter option?",
    "Whoop says my HRV dropped after the late dinners. Should I worry?",
];

const OFFLINE_ELYX_REPLIES: [&str; 5] = [
    "PERSONA: Ruby\nGreat to hear! Keep the evening walks going and tell us how the knee feels.",
    "PERSONA: Rachel\nLet's swap in two 20-minute hotel circuits for the travel days.\nACTION: {\"type\":\"schedule_exercise_update\",\"reason\":\"travel-friendly progression\"}",
    "PERSONA: Carla\nMagnesium glycinate can help some people. Start with food first: leafy greens and nuts.\nACTION: {\"type\":\"schedule_diet_update\",\"reason\":\"magnesium-rich meals\"}",
    "PERSONA: Advik\nLate meals often dent HRV. Try finishing dinner 3 hours before bed this week.\nACTION: {\"type\":\"track_time_commitment\",\"hours\":0.5,\"activity\":\"recovery\"}",
    "PERSONA: Dr. Warren\nYour numbers look steady. We'll review lipids together at the quarterly check.",
];

/// Deterministic client cycling through canned replies per voice.
#[derive(Debug, Default)]
pub struct OfflineLlm {
    member_turns: Cell<usize>,
    elyx_turns: Cell<usize>,
}

impl OfflineLlm {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LlmClient for OfflineLlm {
    fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let (counter, replies) = match request.voice {
            Voice::Member => (&self.member_turns, &OFFLINE_MEMBER_REPLIES),
            Voice::Elyx => (&self.elyx_turns, &OFFLINE_ELYX_REPLIES),
        };
        let turn = counter.get();
        counter.set(turn + 1);
        Ok(replies[turn % replies.len()].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ChatRequest {
        ChatRequest {
            voice: Voice::Elyx,
            system: "sys".to_string(),
            developer: "dev".to_string(),
            user: "hello".to_string(),
            max_tokens: 280,
        }
    }

    #[test]
    fn provider_parses_and_displays() {
        assert_eq!("OpenAI".parse::<Provider>().expect("openai"), Provider::OpenAi);
        assert_eq!(" gemini ".parse::<Provider>().expect("gemini"), Provider::Gemini);
        assert!("auto".parse::<Provider>().is_err());
        assert_eq!(Provider::Anthropic.to_string(), "anthropic");
        assert_eq!(serde_json::to_string(&Provider::OpenAi).expect("ser"), "\"openai\"");
    }

    #[test]
    fn endpoints_default_per_provider() {
        assert_eq!(endpoint(Provider::OpenAi, "", "m"), OPENAI_COMPATIBLE_URL);
        assert_eq!(endpoint(Provider::Anthropic, "", "m"), ANTHROPIC_URL);
        assert_eq!(
            endpoint(Provider::Gemini, "", "gemini-2.0-flash-lite"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash-lite:generateContent"
        );
        assert_eq!(
            endpoint(Provider::OpenAi, " http://localhost:8080/v1 ", "m"),
            "http://localhost:8080/v1"
        );
    }

    #[test]
    fn openai_body_stacks_system_prompts() {
        let body = build_body(Provider::OpenAi, "gpt-4o-mini", &request(), 0.7);
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "dev");
        assert_eq!(messages[2], json!({ "role": "user", "content": "hello" }));
        assert_eq!(body["max_tokens"], 280);
    }

    #[test]
    fn anthropic_and_gemini_bodies() {
        let body = build_body(Provider::Anthropic, "claude", &request(), 0.5);
        assert_eq!(body["system"], "sys\n\ndev");
        assert_eq!(body["messages"][0]["content"], "hello");

        let body = build_body(Provider::Gemini, "gemini", &request(), 0.5);
        assert_eq!(
            body["contents"][0]["parts"][0]["text"],
            "[SYSTEM]\nsys\n\n[DEVELOPER]\ndev\n\nhello"
        );
    }

    #[test]
    fn extracts_text_per_provider() {
        let openai = json!({ "choices": [{ "message": { "content": " hi " } }] });
        assert_eq!(extract_text(Provider::OpenAi, &openai).expect("openai"), "hi");
        let legacy = json!({ "choices": [{ "text": "old" }] });
        assert_eq!(extract_text(Provider::OpenAi, &legacy).expect("legacy"), "old");
        let anthropic = json!({ "content": [{ "type": "text", "text": "yo" }] });
        assert_eq!(extract_text(Provider::Anthropic, &anthropic).expect("anthropic"), "yo");
        let gemini = json!({ "candidates": [{ "content": { "parts": [{ "text": "hey" }] } }] });
        assert_eq!(extract_text(Provider::Gemini, &gemini).expect("gemini"), "hey");

        let err = extract_text(Provider::Gemini, &json!({ "error": "quota" })).expect_err("shape");
        assert!(matches!(err, LlmError::Malformed(_)));
    }

    #[test]
    fn http_client_requires_key() {
        let cfg = LlmConfig::default();
        let err = HttpLlmClient::from_config(&cfg, Some("  ".to_string()))
            .err()
            .expect("missing key");
        assert_eq!(err.to_string(), "missing API key: set LLM_API_KEY");
    }

    #[test]
    fn transport_errors_do_not_leak_the_api_key() {
        let cfg = LlmConfig {
            provider: Provider::Gemini,
            // Nothing listens on port 1; the key also rides in the query string.
            base_url: "http://127.0.0.1:1/v1beta/models/m:generateContent?key=AIzaSECRET123"
                .to_string(),
            timeout_secs: 2,
            ..LlmConfig::default()
        };
        let client =
            HttpLlmClient::from_config(&cfg, Some("AIzaSECRET123".to_string())).expect("client");

        let err = client.complete(&request()).expect_err("connection refused");

        assert!(matches!(err, LlmError::Transport(_)));
        let chain = format!("{:#}", anyhow::Error::new(err));
        assert!(!chain.contains("AIzaSECRET123"), "leaked: {chain}");
    }

    #[test]
    fn offline_replies_cycle_per_voice() {
        let llm = OfflineLlm::new();
        let mut member = request();
        member.voice = Voice::Member;
        let first = llm.complete(&member).expect("member");
        let elyx = llm.complete(&request()).expect("elyx");
        assert_eq!(first, OFFLINE_MEMBER_REPLIES[0]);
        assert!(elyx.starts_with("PERSONA: Ruby"));
        assert_eq!(llm.complete(&member).expect("member"), OFFLINE_MEMBER_REPLIES[1]);
    }
}
