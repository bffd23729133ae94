//! Model selection and the registry of known back-ends.
//!
//! [`ModelRouter`] decides which model serves a request. The shipped
//! [`StaticRouter`] always picks one fixed model; cost- or quality-aware
//! routers can be swapped in without touching the dispatcher.
//!
//! [`ClientRegistry`] keeps every back-end the pipeline knows about, local
//! models served by the inference server and hosted API models, keyed by
//! model name.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::request::ApiType;

/// Chooses a model identifier for a request.
pub trait ModelRouter: Send + Sync {
    fn select_model(&self, query: &str, context: &str, api_type: ApiType) -> String;
}

/// Routes every request to the same model.
#[derive(Debug, Clone)]
pub struct StaticRouter {
    model: String,
}

impl StaticRouter {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.llm.model.clone())
    }
}

impl ModelRouter for StaticRouter {
    fn select_model(&self, _query: &str, _context: &str, _api_type: ApiType) -> String {
        self.model.clone()
    }
}

/// Where a back-end runs.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendKind {
    /// Served by the local inference server at `base_url`.
    Local { base_url: String },
    /// Hosted API; the key is read from `api_key_env` when needed.
    Hosted {
        api_key_env: String,
        context_length: usize,
        embedding_length: Option<usize>,
        cost_per_token: f64,
    },
}

/// A selectable model back-end.
#[derive(Debug, Clone, PartialEq)]
pub struct Backend {
    pub model_name: String,
    pub kind: BackendKind,
}

impl Backend {
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            BackendKind::Local { .. } => "local",
            BackendKind::Hosted { .. } => "hosted",
        }
    }

    /// API key for hosted back-ends, if the environment provides one.
    pub fn api_key(&self) -> Option<String> {
        match &self.kind {
            BackendKind::Hosted { api_key_env, .. } => std::env::var(api_key_env)
                .ok()
                .filter(|k| !k.trim().is_empty()),
            BackendKind::Local { .. } => None,
        }
    }

    /// Estimated cost of `tokens` tokens; zero for local models.
    pub fn estimate_cost(&self, tokens: usize) -> f64 {
        match &self.kind {
            BackendKind::Hosted { cost_per_token, .. } => *cost_per_token * tokens as f64,
            BackendKind::Local { .. } => 0.0,
        }
    }
}

/// Back-ends by model name.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    base_url: String,
    clients: BTreeMap<String, Backend>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

impl ClientRegistry {
    /// Registry holding the configured local model and hosted back-ends.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self {
            base_url: config.llm.base_url.trim_end_matches('/').to_string(),
            clients: BTreeMap::new(),
        };
        registry.register_local(&config.llm.model);

        for hosted in &config.backends.hosted {
            registry.register(Backend {
                model_name: hosted.name.clone(),
                kind: BackendKind::Hosted {
                    api_key_env: hosted.api_key_env.clone(),
                    context_length: hosted.context_length,
                    embedding_length: hosted.embedding_length,
                    cost_per_token: hosted.cost_per_token,
                },
            });
        }
        registry
    }

    pub fn register(&mut self, backend: Backend) {
        self.clients.insert(backend.model_name.clone(), backend);
    }

    fn register_local(&mut self, model_name: &str) {
        let backend = Backend {
            model_name: model_name.to_string(),
            kind: BackendKind::Local {
                base_url: self.base_url.clone(),
            },
        };
        self.register(backend);
    }

    pub fn get(&self, model_name: &str) -> Option<&Backend> {
        self.clients.get(model_name)
    }

    /// All back-ends, ordered by model name.
    pub fn all(&self) -> impl Iterator<Item = &Backend> {
        self.clients.values()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Register every model the local server lists under `GET /api/tags`.
    ///
    /// Returns the number of models found.
    pub async fn discover_local(&mut self, timeout: Option<Duration>) -> Result<usize> {
        let url = format!("{}/api/tags", self.base_url);
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build()?;

        debug!("GET {}", url);
        let tags: TagsResponse = client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed (is the inference server running?)", url))?
            .error_for_status()
            .with_context(|| format!("Non-2xx from {}", url))?
            .json()
            .await
            .context("Failed to parse model list")?;

        let names: Vec<String> = tags
            .models
            .into_iter()
            .filter_map(|m| m.model.or(m.name))
            .collect();
        for name in &names {
            self.register_local(name);
        }
        info!(found = names.len(), "discovered local models");
        Ok(names.len())
    }
}
