//! # Path Resolver
//!
//! Resolves archival catalogue records from a hierarchical relational source
//! into flat search documents, each with one canonical identifier and the set
//! of reference strings it can be addressed by, then bulk-loads them into a
//! search index under controlled write pressure.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │ SQLite mirror│──▶│ Canonicalizer │──▶│ Bulk ingest  │──▶ search index
//! │ (per level)  │   │ keys/dates/   │   │ refresh +    │
//! └──────────────┘   │ eras/guides   │   │ pacing       │
//!                    └───────────────┘   └──────┬───────┘
//!                                               │
//!                              ┌────────────────┤
//!                              ▼                ▼
//!                        ┌──────────┐     ┌──────────┐
//!                        │   CLI    │     │   HTTP   │
//!                        │(resolver)│     │ trigger  │
//!                        └──────────┘     └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`path`] | Hierarchy levels and record paths |
//! | [`keys`] | Canonical ID and match keys |
//! | [`fragments`] | Fragment ("URL hacking") keys |
//! | [`dates`] | Date parsing, repair and era overlap |
//! | [`guides`] | Research-guide matching |
//! | [`reference`] | Eras, guides and taxonomy shards |
//! | [`models`] | Source rows and resolved records |
//! | [`canonical`] | Row → record |
//! | [`db`] | Source database connection |
//! | [`source`] | Per-level catalogue queries |
//! | [`index`] | Search index trait, Elasticsearch and in-memory backends |
//! | [`mappings`] | Index settings and field mappings |
//! | [`stats`] | Volume lookup and pacing |
//! | [`progress`] | Ingest progress reporting |
//! | [`ingest`] | Bulk ingest pipeline |
//! | [`resolve`] | Reference lookup |
//! | [`server`] | HTTP trigger |

pub mod canonical;
pub mod config;
pub mod dates;
pub mod db;
pub mod fragments;
pub mod guides;
pub mod index;
pub mod ingest;
pub mod keys;
pub mod mappings;
pub mod models;
pub mod path;
pub mod progress;
pub mod reference;
pub mod resolve;
pub mod server;
pub mod source;
pub mod stats;
