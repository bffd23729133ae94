//! # Concept Miner
//!
//! Mines key concepts out of a personal markdown notes directory with a
//! local LLM server, embeds and stores them in SQLite, and weaves related
//! concepts into a similarity network.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────┐   ┌────────────┐   ┌──────────┐
//! │  Notes   │──▶│ Dispatcher            │──▶│ Embed +    │──▶│  SQLite  │
//! │ (walk)   │   │ chunk → pool → parse  │   │ count      │   │ concepts │
//! └──────────┘   └───────────────────────┘   └────────────┘   └────┬─────┘
//!                                                                  │
//!                                                   weave ◀────────┘
//!                                                 (networks)
//! ```
//!
//! The core is the chunked-context dispatcher: a large text is split into
//! overlapping windows, each window is sent to the model through a bounded
//! worker pool, and every answer is parsed into a structured record. Window
//! failures are reported, never fatal.
//!
//! ## Quick Start
//!
//! ```bash
//! cmine init                    # create database
//! cmine mine --limit 10         # extract, embed, store, weave
//! cmine concepts                # list what was found
//! cmine show <id>               # one concept and its links
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`chunk`] | Overlapping context windows, token estimate |
//! | [`request`] | Back-end request payloads |
//! | [`router`] | Model routing and back-end registry |
//! | [`llm`] | HTTP client and transport seam |
//! | [`parse`] | Response text extraction and tolerant parsing |
//! | [`pool`] | Bounded worker pools |
//! | [`dispatch`] | Chunk fan-out and per-chunk outcomes |
//! | [`embedding`] | Embeddings and vector utilities |
//! | [`notes`] | Notes directory traversal |
//! | [`extract`] | Key-concept extraction |
//! | [`store`] | Concept and network persistence |
//! | [`weave`] | Similarity network construction |
//! | [`mine`] | End-to-end mining pipeline |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod backends;
pub mod chunk;
pub mod concepts;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod embedding;
pub mod extract;
pub mod llm;
pub mod migrate;
pub mod mine;
pub mod models;
pub mod notes;
pub mod parse;
pub mod pool;
pub mod progress;
pub mod query;
pub mod request;
pub mod router;
pub mod stats;
pub mod store;
pub mod weave;
