//! Escalating classification of support tickets.

pub mod api;
pub mod catalog;
pub mod classifier;
pub mod config;
pub mod error;
pub mod intake;
pub mod llm;
pub mod pipeline;
