//! tenderscout - public procurement tender acquisition and monitoring.
//!
//! Scrapes a stateful, JavaScript-heavy government procurement portal,
//! extracts structured tender records from its result tables, classifies
//! them by technology relevance, and keeps an incrementally synced local
//! store with an LLM assistant on top.

pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod etl;
pub mod llm;
pub mod models;
pub mod repository;
pub mod scrapers;
