//! Back-end request payloads.
//!
//! Turns an instruction and a chunk into the JSON body expected by the
//! local inference server for one of its three endpoints.

use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::router::ModelRouter;

/// Which endpoint a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    Generate,
    Chat,
    Embeddings,
}

impl ApiType {
    /// Endpoint path relative to the back-end base URL.
    pub fn path(&self) -> &'static str {
        match self {
            ApiType::Generate => "/api/generate",
            ApiType::Chat => "/api/chat",
            ApiType::Embeddings => "/api/embeddings",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiType::Generate => "generate",
            ApiType::Chat => "chat",
            ApiType::Embeddings => "embeddings",
        }
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unsupported API type: '{0}'. Must be generate, chat, or embeddings.")]
pub struct UnsupportedApiType(pub String);

impl FromStr for ApiType {
    type Err = UnsupportedApiType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generate" => Ok(ApiType::Generate),
            "chat" => Ok(ApiType::Chat),
            "embeddings" => Ok(ApiType::Embeddings),
            other => Err(UnsupportedApiType(other.to_string())),
        }
    }
}

/// Structured-output mode requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    Json,
    None,
}

#[derive(Debug, thiserror::Error)]
#[error("Unsupported response format: '{0}'. Must be json or none.")]
pub struct UnsupportedFormat(pub String);

impl FromStr for ResponseFormat {
    type Err = UnsupportedFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(ResponseFormat::Json),
            "none" => Ok(ResponseFormat::None),
            other => Err(UnsupportedFormat(other.to_string())),
        }
    }
}

/// One request, built fresh per chunk.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub instruction: String,
    pub title: String,
    pub chunk: String,
    pub api_type: ApiType,
    pub format: ResponseFormat,
}

impl ChunkRequest {
    /// Chunk text as sent to the model: the title, a blank line, the window.
    pub fn titled_chunk(&self) -> String {
        format!("{}\n\n{}", self.title, self.chunk)
    }

    pub fn payload(&self, router: &dyn ModelRouter) -> Value {
        build_request(
            router,
            &self.instruction,
            &self.titled_chunk(),
            self.api_type,
            self.format,
        )
    }
}

/// Prompt template shared by `generate` and `chat`.
pub fn render_prompt(instruction: &str, chunk: &str) -> String {
    format!("{} ``` {} ``` ", instruction, chunk)
}

/// Build the JSON body for `api_type`.
///
/// `embeddings` sends only the instruction as prompt; `chunk` is ignored.
pub fn build_request(
    router: &dyn ModelRouter,
    instruction: &str,
    chunk: &str,
    api_type: ApiType,
    format: ResponseFormat,
) -> Value {
    let model = router.select_model(instruction, chunk, api_type);
    let mut data = json!({ "model": model });

    match api_type {
        ApiType::Generate => {
            data["prompt"] = json!(render_prompt(instruction, chunk));
            data["stream"] = json!(false);
        }
        ApiType::Chat => {
            data["messages"] = json!([{
                "role": "user",
                "content": render_prompt(instruction, chunk),
            }]);
            data["stream"] = json!(false);
        }
        ApiType::Embeddings => {
            data["prompt"] = json!(instruction);
            return data;
        }
    }

    if format == ResponseFormat::Json {
        data["format"] = json!("json");
    }
    data
}
