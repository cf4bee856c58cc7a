//! Core library: rule catalog, ingestion, retrieval, compliance checking and reports.

pub mod catalog;
pub mod checker;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod models;
pub mod parse;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod vectorstore;
