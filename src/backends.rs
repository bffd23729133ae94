//! `cmine models`: list the registered back-ends.

use anyhow::Result;
use std::time::Duration;

use crate::config::Config;
use crate::router::{BackendKind, ClientRegistry};

pub async fn run_models(config: &Config, discover: bool) -> Result<()> {
    let mut registry = ClientRegistry::from_config(config);
    if discover {
        let timeout = config.llm.timeout_secs.map(Duration::from_secs);
        match registry.discover_local(timeout).await {
            Ok(n) => println!("discovered {} local model(s)", n),
            Err(e) => eprintln!("Warning: local discovery failed: {:#}", e),
        }
    }

    println!(
        "{:<32} {:<8} {:>10} {:>10} {:>12}  KEY",
        "MODEL", "KIND", "CONTEXT", "EMBED", "$/1M TOK"
    );
    for backend in registry.all() {
        match &backend.kind {
            BackendKind::Local { base_url } => println!(
                "{:<32} {:<8} {:>10} {:>10} {:>12}  {}",
                backend.model_name, "local", "-", "-", "0", base_url
            ),
            BackendKind::Hosted {
                api_key_env,
                context_length,
                embedding_length,
                ..
            } => {
                let key = if backend.api_key().is_some() { "set" } else { "missing" };
                println!(
                    "{:<32} {:<8} {:>10} {:>10} {:>12.4}  {} ({})",
                    backend.model_name,
                    "hosted",
                    context_length,
                    embedding_length.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
                    backend.estimate_cost(1_000_000),
                    api_key_env,
                    key
                );
            }
        }
    }
    Ok(())
}
