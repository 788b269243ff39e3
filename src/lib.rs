pub mod agents;
pub mod cli;
pub mod config;
pub mod defaults;
pub mod docker;
pub mod doctor;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod memory;
pub mod messages;
pub mod orchestrator;
pub mod provider;
pub mod repo_id;
pub mod retrieval;
pub mod streaming;
pub mod team;
pub mod telemetry;
pub mod todos;
pub mod tools;

#[cfg(test)]
mod tests;
