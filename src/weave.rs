//! Network weaving.
//!
//! Links stored concepts into a directed similarity network. A strategy is
//! written `<feature>,<metric>,<selection>`:
//!
//! | Part | Supported |
//! |------|-----------|
//! | feature | `vector` (the stored embedding) |
//! | metric | `similarity` (cosine) |
//! | selection | `threshold`, `topk` |
//!
//! `threshold` links every pair at or above `[weave].threshold`, from the
//! earlier concept to the later one. `topk` links each concept to its
//! `[weave].top_k` most similar peers.

use anyhow::Result;
use sqlx::SqlitePool;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::config::{Config, WeaveConfig};
use crate::db;
use crate::embedding::cosine_similarity;
use crate::models::Link;
use crate::store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Vector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Similarity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Threshold,
    TopK,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeaveStrategy {
    pub feature: Feature,
    pub metric: Metric,
    pub selection: Selection,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StrategyError {
    #[error("weave strategy must be '<feature>,<metric>,<selection>', got '{0}'")]
    Shape(String),
    #[error("unsupported weave feature '{0}' (expected: vector)")]
    Feature(String),
    #[error("unsupported weave metric '{0}' (expected: similarity)")]
    Metric(String),
    #[error("unsupported weave selection '{0}' (expected: threshold or topk)")]
    Selection(String),
}

impl FromStr for WeaveStrategy {
    type Err = StrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [feature, metric, selection] = parts.as_slice() else {
            return Err(StrategyError::Shape(s.to_string()));
        };

        let feature = match *feature {
            "vector" => Feature::Vector,
            other => return Err(StrategyError::Feature(other.to_string())),
        };
        let metric = match *metric {
            "similarity" => Metric::Similarity,
            other => return Err(StrategyError::Metric(other.to_string())),
        };
        let selection = match *selection {
            "threshold" => Selection::Threshold,
            "topk" => Selection::TopK,
            other => return Err(StrategyError::Selection(other.to_string())),
        };

        Ok(Self {
            feature,
            metric,
            selection,
        })
    }
}

impl fmt::Display for WeaveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let selection = match self.selection {
            Selection::Threshold => "threshold",
            Selection::TopK => "topk",
        };
        write!(f, "vector,similarity,{}", selection)
    }
}

/// Edges for `nodes` (id, vector) in the given order.
pub fn compute_links(
    nodes: &[(String, Vec<f32>)],
    strategy: WeaveStrategy,
    config: &WeaveConfig,
) -> Vec<Link> {
    let label = strategy.to_string();
    let score = |a: &[f32], b: &[f32]| match strategy.metric {
        Metric::Similarity => cosine_similarity(a, b),
    };
    let link = |from: &str, to: &str, similarity: f32| Link {
        source_id: from.to_string(),
        target_id: to.to_string(),
        similarity,
        strategy: label.clone(),
    };

    let mut links = Vec::new();
    match strategy.selection {
        Selection::Threshold => {
            for (i, (a_id, a)) in nodes.iter().enumerate() {
                for (b_id, b) in &nodes[i + 1..] {
                    let sim = score(a.as_slice(), b.as_slice());
                    if sim >= config.threshold {
                        links.push(link(a_id.as_str(), b_id.as_str(), sim));
                    }
                }
            }
        }
        Selection::TopK => {
            for (i, (a_id, a)) in nodes.iter().enumerate() {
                let mut scored: Vec<(usize, f32)> = nodes
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(j, (_, b))| (j, score(a.as_slice(), b.as_slice())))
                    .collect();
                scored.sort_by(|x, y| y.1.partial_cmp(&x.1).unwrap_or(Ordering::Equal));
                for (j, sim) in scored.into_iter().take(config.top_k) {
                    links.push(link(a_id.as_str(), nodes[j].0.as_str(), sim));
                }
            }
        }
    }
    links
}

/// Summary of one weave run.
#[derive(Debug, Clone, PartialEq)]
pub struct WeaveSummary {
    pub strategy: WeaveStrategy,
    pub concepts: usize,
    pub links: u64,
}

/// Rebuild the whole network from stored embeddings.
pub async fn weave(
    pool: &SqlitePool,
    strategy: WeaveStrategy,
    config: &WeaveConfig,
) -> Result<WeaveSummary> {
    let nodes = store::load_embeddings(pool).await?;
    let links = compute_links(&nodes, strategy, config);
    let written = store::replace_links(pool, &links).await?;
    tracing::info!(
        strategy = %strategy,
        concepts = nodes.len(),
        links = written,
        "network woven"
    );
    Ok(WeaveSummary {
        strategy,
        concepts: nodes.len(),
        links: written,
    })
}

/// CLI entry point: rebuild the network and refresh link counts.
pub async fn run_weave(config: &Config, strategy: Option<&str>) -> Result<()> {
    let strategy: WeaveStrategy = strategy.unwrap_or(&config.weave.strategy).parse()?;
    let pool = db::connect(config).await?;
    let summary = weave(&pool, strategy, &config.weave).await?;
    store::update_link_counts(&pool).await?;
    pool.close().await;

    println!("weave {}", summary.strategy);
    println!("  concepts with embeddings: {}", summary.concepts);
    println!("  links: {}", summary.links);
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes() -> Vec<(String, Vec<f32>)> {
        vec![
            ("a".into(), vec![1.0, 0.0]),
            ("b".into(), vec![0.9, 0.1]),
            ("c".into(), vec![0.0, 1.0]),
        ]
    }

    #[test]
    fn parses_strategies() {
        let s: WeaveStrategy = "vector,similarity,threshold".parse().unwrap();
        assert_eq!(s.selection, Selection::Threshold);
        let s: WeaveStrategy = " vector , similarity , topk ".parse().unwrap();
        assert_eq!(s.selection, Selection::TopK);
        assert_eq!(s.to_string(), "vector,similarity,topk");
    }

    #[test]
    fn rejects_bad_strategies() {
        assert!(matches!(
            "vector,similarity".parse::<WeaveStrategy>(),
            Err(StrategyError::Shape(_))
        ));
        assert!(matches!(
            "text,similarity,threshold".parse::<WeaveStrategy>(),
            Err(StrategyError::Feature(_))
        ));
        assert!(matches!(
            "vector,distance,threshold".parse::<WeaveStrategy>(),
            Err(StrategyError::Metric(_))
        ));
        assert!(matches!(
            "vector,similarity,all".parse::<WeaveStrategy>(),
            Err(StrategyError::Selection(_))
        ));
    }

    #[test]
    fn threshold_links_earlier_to_later() {
        let config = WeaveConfig {
            threshold: 0.8,
            ..WeaveConfig::default()
        };
        let strategy = "vector,similarity,threshold".parse().unwrap();
        let links = compute_links(&nodes(), strategy, &config);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].source_id, "a");
        assert_eq!(links[0].target_id, "b");
        assert!(links[0].similarity > 0.99);
    }

    #[test]
    fn topk_links_nearest_peers() {
        let config = WeaveConfig {
            top_k: 1,
            ..WeaveConfig::default()
        };
        let strategy = "vector,similarity,topk".parse().unwrap();
        let links = compute_links(&nodes(), strategy, &config);
        let pairs: Vec<(&str, &str)> = links
            .iter()
            .map(|l| (l.source_id.as_str(), l.target_id.as_str()))
            .collect();
        assert_eq!(pairs, vec![("a", "b"), ("b", "a"), ("c", "b")]);
    }

    #[test]
    fn empty_and_single_node_produce_no_links() {
        let config = WeaveConfig::default();
        let strategy = "vector,similarity,topk".parse().unwrap();
        assert!(compute_links(&[], strategy, &config).is_empty());
        assert!(compute_links(&nodes()[..1], strategy, &config).is_empty());
    }
}
