//! agentdesk: HTTP agent backend over an LLM tool-dispatch façade.
//!
//! Library root; the binary entry point is `src/main.rs`.  Integration
//! tests drive the same modules through this crate.

pub mod bootstrap;
pub mod core;
pub mod llm;
pub mod subsystems;
pub mod supervisor;

pub use crate::core::{config, error};
