//! Ad-hoc queries against the inference server.
//!
//! `cmine query` runs one instruction over one file through the dispatcher;
//! `cmine embed` prints the embedding of a text.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::dispatch::{ChunkOutput, DispatchOptions, Dispatcher};
use crate::embedding::embed;
use crate::llm::LlmClient;
use crate::pool::Pools;

/// Overrides for the `[dispatch]` defaults.
#[derive(Debug, Clone, Default)]
pub struct QueryArgs {
    pub api_type: Option<String>,
    pub format: Option<String>,
    pub chunk_size: Option<usize>,
}

impl QueryArgs {
    fn resolve(&self, config: &Config) -> Result<DispatchOptions> {
        let mut dispatch = config.dispatch.clone();
        if let Some(api_type) = &self.api_type {
            dispatch.api_type = api_type.clone();
        }
        if let Some(format) = &self.format {
            dispatch.format = format.clone();
        }
        if let Some(chunk_size) = self.chunk_size {
            dispatch.chunk_size = chunk_size;
        }
        DispatchOptions::from_config(&dispatch)
    }
}

pub async fn run_query(
    config: &Config,
    file: &Path,
    instruction: &str,
    args: &QueryArgs,
) -> Result<()> {
    let options = args.resolve(config)?;
    let context = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let title = file.display().to_string();

    let client = Arc::new(LlmClient::from_config(config)?);
    let pools = Pools::from_config(&config.pool);
    let dispatcher = Dispatcher::new(client, pools.chunks.clone());

    let result = dispatcher
        .dispatch(instruction, &title, &context, &options)
        .await;
    pools.shutdown(true, false).await;
    let report = result?;

    for output in &report.results {
        match output {
            ChunkOutput::Record(_) => println!("{}", serde_json::to_string(output)?),
            ChunkOutput::Text(text) => println!("{}\n", text),
        }
    }
    for (index, failure) in report.failures() {
        eprintln!("chunk {} failed: {}", index, failure);
    }

    println!("query {}", title);
    println!("  succeeded: {}", report.succeeded());
    println!("  failed: {}", report.failed());
    println!("  skipped: {}", report.skipped());
    Ok(())
}

pub async fn run_embed(config: &Config, text: &str) -> Result<()> {
    let client = LlmClient::from_config(config)?;
    let vector = embed(&client, text).await?;

    let preview: Vec<String> = vector.iter().take(8).map(|v| format!("{:.4}", v)).collect();
    println!("dims: {}", vector.len());
    println!("head: [{}]", preview.join(", "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ApiType, ResponseFormat};

    #[test]
    fn overrides_apply_on_top_of_config() {
        let config = Config::with_db_path("x.sqlite");
        let args = QueryArgs {
            api_type: Some("chat".into()),
            format: None,
            chunk_size: Some(256),
        };
        let options = args.resolve(&config).unwrap();
        assert_eq!(options.api_type, ApiType::Chat);
        assert_eq!(options.format, ResponseFormat::Json);
        assert_eq!(options.chunk_size, 256);
    }

    #[test]
    fn unknown_override_is_an_error() {
        let config = Config::with_db_path("x.sqlite");
        let args = QueryArgs {
            format: Some("yaml".into()),
            ..QueryArgs::default()
        };
        assert!(args.resolve(&config).is_err());
    }
}
