//! # gitinsight
//!
//! Conversational question answering over the source files of a Git
//! repository.
//!
//! A repository is cloned into a working directory, its files for one
//! programming language are split along syntax boundaries, embedded, and
//! upserted into a vector index. Questions are answered by a chat model
//! from chunks retrieved with maximal marginal relevance, with a running
//! summary standing in for the conversation history.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────┐   ┌──────────────┐
//! │  Fetch   │──▶│ Load → Split → Embed │──▶│ Vector index │
//! │ git clone│   │                      │   │ Pinecone/mem │
//! └──────────┘   └──────────────────────┘   └──────┬───────┘
//!                                                  │ MMR
//!                                           ┌──────▼───────┐
//!                                           │    Engine    │
//!                                           │ Gemini + sum │
//!                                           └──────┬───────┘
//!                          ┌───────────────────────┼──────────┐
//!                          ▼                       ▼          ▼
//!                     ┌─────────┐            ┌──────────┐ ┌────────┐
//!                     │   CLI   │            │   chat   │ │  HTTP  │
//!                     └─────────┘            └──────────┘ └────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment secrets |
//! | [`error`] | Typed errors per component |
//! | [`models`] | Documents, chunks, vector records, messages |
//! | [`language`] | Supported languages and their separators |
//! | [`fetch`] | Repository cloning |
//! | [`loader`] | Source file discovery |
//! | [`chunk`] | Language-aware text splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index abstraction (Pinecone, in-memory) |
//! | [`search`] | Similarity and MMR retrieval |
//! | [`llm`] | Chat model abstraction (Gemini) |
//! | [`engine`] | Retrieval-augmented conversation with summary memory |
//! | [`ingest`] | Ingestion pipeline |
//! | [`cleanup`] | Forced directory removal |
//! | [`session`] | Session controller: Process, Ask, Clear |
//! | [`present`] | User-facing text |
//! | [`chat_cmd`] | Terminal chat |
//! | [`server`] | HTTP session API |

pub mod chat_cmd;
pub mod chunk;
pub mod cleanup;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod index;
pub mod ingest;
pub mod language;
pub mod llm;
pub mod loader;
pub mod models;
pub mod present;
pub mod search;
pub mod server;
pub mod session;
