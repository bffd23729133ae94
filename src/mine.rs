//! Mining pipeline orchestration.
//!
//! Coordinates the full run: scan notes, extract key concepts per note on
//! the file pool (each note fanning out its chunks on the chunk pool),
//! count tokens and embed each concept, store, weave the network, and
//! refresh link counts. Embedding failures are non-fatal: the concept is
//! stored without a vector and left out of the network.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::chunk::count_tokens;
use crate::config::Config;
use crate::db;
use crate::dispatch::{DispatchOptions, DispatchReport, Dispatcher};
use crate::embedding::embed;
use crate::extract::ConceptExtractor;
use crate::llm::LlmClient;
use crate::models::{NewConcept, NoteFile};
use crate::notes::scan_notes;
use crate::pool::Pools;
use crate::progress::{MineProgressEvent, ProgressMode, ProgressReporter};
use crate::store;
use crate::weave::{weave, WeaveStrategy};

/// Counts from one mining run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MineSummary {
    pub notes: usize,
    pub notes_failed: usize,
    pub concepts_extracted: usize,
    pub concepts_inserted: u64,
    pub embedded: usize,
    pub embeddings_failed: usize,
    pub chunks_succeeded: usize,
    pub chunks_failed: usize,
    pub chunks_skipped: usize,
    pub links: u64,
}

struct NoteResult {
    concepts: Vec<NewConcept>,
    report: DispatchReport,
    embeddings_failed: usize,
}

/// Run the pipeline against an open, migrated database.
pub async fn mine(
    config: &Config,
    pool: &SqlitePool,
    client: Arc<LlmClient>,
    pools: &Pools,
    limit: Option<usize>,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<MineSummary> {
    if let Some(notes) = &config.notes {
        reporter.report(MineProgressEvent::Scanning {
            root: notes.root.display().to_string(),
        });
    }
    let mut notes = scan_notes(config)?;
    if let Some(lim) = limit {
        notes.truncate(lim);
    }
    let total = notes.len() as u64;
    tracing::info!(notes = total, "notes to mine");

    let dispatcher = Dispatcher::new(client.clone(), pools.chunks.clone());
    let extractor = ConceptExtractor::new(
        dispatcher,
        config.extract.instruction.as_deref(),
        DispatchOptions::from_config(&config.dispatch)?,
    );

    let paths: Vec<String> = notes.iter().map(|n| n.relative_path.clone()).collect();
    let done = Arc::new(AtomicU64::new(0));
    let job_reporter = reporter.clone();
    let results = pools
        .files
        .map_unordered(notes, move |note: NoteFile| {
            let extractor = extractor.clone();
            let client = client.clone();
            let reporter = job_reporter.clone();
            let done = done.clone();
            async move {
                let result = mine_note(&extractor, &client, &note).await;
                let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                let concepts = result.as_ref().map(|r| r.concepts.len()).unwrap_or(0);
                reporter.report(MineProgressEvent::Extracting {
                    n,
                    total,
                    path: note.relative_path.clone(),
                    concepts: concepts as u64,
                });
                result
            }
        })
        .await?;

    let mut summary = MineSummary {
        notes: total as usize,
        ..MineSummary::default()
    };
    let mut to_store = Vec::new();

    for (position, joined) in results {
        let path = &paths[position];
        match joined {
            Ok(Ok(note)) => {
                summary.chunks_succeeded += note.report.succeeded();
                summary.chunks_failed += note.report.failed();
                summary.chunks_skipped += note.report.skipped();
                summary.embeddings_failed += note.embeddings_failed;
                summary.concepts_extracted += note.concepts.len();
                summary.embedded += note
                    .concepts
                    .iter()
                    .filter(|c| c.embedding.is_some())
                    .count();
                to_store.extend(note.concepts);
            }
            Ok(Err(e)) => {
                tracing::error!("extracting {} failed: {:#}", path, e);
                summary.notes_failed += 1;
            }
            Err(e) => {
                tracing::error!("note {} did not run: {}", path, e);
                summary.notes_failed += 1;
            }
        }
    }

    summary.concepts_inserted = store::create_concepts(pool, &to_store).await?;
    tracing::info!(
        inserted = summary.concepts_inserted,
        extracted = summary.concepts_extracted,
        "concepts stored"
    );

    let strategy: WeaveStrategy = config.weave.strategy.parse()?;
    reporter.report(MineProgressEvent::Weaving {
        concepts: summary.embedded as u64,
    });
    summary.links = weave(pool, strategy, &config.weave).await?.links;
    store::update_link_counts(pool).await?;

    Ok(summary)
}

async fn mine_note(
    extractor: &ConceptExtractor,
    client: &LlmClient,
    note: &NoteFile,
) -> Result<NoteResult> {
    let (key_concepts, report) = extractor.extract_key_concepts(note).await?;

    let mut concepts = Vec::with_capacity(key_concepts.len());
    let mut embeddings_failed = 0;
    for concept in key_concepts {
        let embedding = match embed(client, &concept.summary).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("embedding '{}' failed: {:#}", concept.title, e);
                embeddings_failed += 1;
                None
            }
        };
        concepts.push(NewConcept {
            token_num: count_tokens(&concept.summary) as i64,
            embedding,
            datasource: note.datasource.clone(),
            concept,
        });
    }

    Ok(NoteResult {
        concepts,
        report,
        embeddings_failed,
    })
}

/// CLI entry point: run the pipeline and print a summary.
pub async fn run_mine(config: &Config, limit: Option<usize>, progress: ProgressMode) -> Result<()> {
    let pool = db::connect(config).await?;
    let client = Arc::new(LlmClient::from_config(config)?);
    let pools = Pools::from_config(&config.pool);
    let reporter: Arc<dyn ProgressReporter> = Arc::from(progress.reporter());

    let result = mine(config, &pool, client, &pools, limit, reporter).await;
    pools.shutdown(true, false).await;
    pool.close().await;
    let summary = result?;

    println!("mine");
    println!("  notes: {} ({} failed)", summary.notes, summary.notes_failed);
    println!(
        "  chunks: {} ok, {} failed, {} skipped",
        summary.chunks_succeeded, summary.chunks_failed, summary.chunks_skipped
    );
    println!("  concepts extracted: {}", summary.concepts_extracted);
    println!("  concepts stored: {}", summary.concepts_inserted);
    println!(
        "  embedded: {} ({} failed)",
        summary.embedded, summary.embeddings_failed
    );
    println!("  links: {}", summary.links);
    println!("ok");

    Ok(())
}
