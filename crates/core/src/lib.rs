//! Core library for Agent OS
//!
//! This crate contains the pieces every runtime shares:
//! - The run event model and its wire envelope
//! - Event sinks and the run journal (JSONL on disk or in memory)
//! - Run-log replay used to resume suspended runs
//! - Agent, tool and policy definition documents

pub mod error;
pub mod run;
pub mod spec;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
