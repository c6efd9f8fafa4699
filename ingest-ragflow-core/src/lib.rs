#![doc = "ingest-ragflow-core: core pipeline library for ingest-ragflow."]

//! This crate holds the DSpace → RAGFlow pipeline: file discovery, the
//! bounded-parallel upload dispatcher, the parse-status monitor, the DSpace
//! client and the contracts both remote platforms are accessed through.
//! The RAGFlow HTTP client lives in the CLI crate and plugs in through
//! [`contract::KnowledgeBase`].
//!
//! # Usage
//! Build a [`contract::Repository`] and a [`contract::KnowledgeBase`], then call
//! [`pipeline::upload_folder`] or [`pipeline::ingest_collections`].

pub mod cleanup;
pub mod config;
pub mod contract;
pub mod discovery;
pub mod dispatcher;
pub mod dspace;
pub mod error;
pub mod harvest;
pub mod monitor;
pub mod pipeline;
pub mod progress;
pub mod reader;
pub mod report;
pub mod stats;
