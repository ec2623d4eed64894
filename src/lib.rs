//! # Uloom Quran
//!
//! A read-only reference service over Quranic text, tafsir commentaries,
//! qiraat (reading variants and recitation rules) and asbab al-nuzul, with
//! a retrieval-augmented question-answering layer that passes through to an
//! OpenAI-compatible API and a Qdrant vector store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌──────────────┐
//! │ JSON bundles │──▶│  import  │──▶│    SQLite    │
//! └──────────────┘   └──────────┘   │ (read-only   │
//!                                   │  at serve)   │
//!                                   └──────┬───────┘
//!                       ┌──────────────────┤
//!                       ▼                  ▼
//!                 ┌──────────┐       ┌──────────┐     ┌─────────────────┐
//!                 │   CLI    │       │   HTTP   │────▶│ OpenAI / Qdrant │
//!                 │ (uloom)  │       │  (axum)  │     └─────────────────┘
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! uloom init                          # create schema + reference data
//! uloom import ./data/corpus.json     # load a corpus bundle
//! uloom verse 2:255
//! uloom resolve between_surahs nafi --transmitter warsh
//! uloom serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Verse keys, readers, transmitters, row types |
//! | [`db`] | Writable and read-only SQLite pools |
//! | [`migrate`] | Schema creation |
//! | [`seed`] | Reference data: readers, rules, tafsir sources, riwayat |
//! | [`import`] | Transactional corpus bundle import |
//! | [`quran`] | Surah/verse lookup, keyword search, corpus stats |
//! | [`rules`] | Three-level qiraat rule resolution |
//! | [`qiraat`] | Variants, riwayat, search, reciters |
//! | [`tafsir`] | Tafsir sources and comparison layouts |
//! | [`asbab`] | Revelation context records |
//! | [`ai`] | Embedding, chat and vector-store pass-through |
//! | [`server`] | HTTP API |
//! | [`error`] | Lookup errors and the HTTP error envelope |

pub mod ai;
pub mod asbab;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod migrate;
pub mod models;
pub mod qiraat;
pub mod quran;
pub mod rules;
pub mod seed;
pub mod server;
pub mod tafsir;
