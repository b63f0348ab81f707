//! Data models shared by the extractor, the protector and the pipeline.

pub mod config;
pub mod record;
pub mod table;
pub mod workflow;
