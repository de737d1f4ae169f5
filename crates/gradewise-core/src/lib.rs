//! gradewise-core: Grading engine, rule registry, and grading quality monitor.
//!
//! This crate defines the data model, the text utilities the grading
//! strategies share, and the two stateful components (rule registry and
//! quality monitor) that the rest of gradewise builds on.

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod keywords;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod quality;
pub mod report;
pub mod rules;
pub mod similarity;
pub mod statistics;
pub mod strategy;
pub mod traits;
