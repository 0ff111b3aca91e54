//! # deskpilot
//!
//! A command-line assistant that drives the local desktop through an LLM.
//!
//! This library provides:
//! - A tool-based agent loop with bounded iterations and retries
//! - Model tier selection with a daily quota on the capable model
//! - Desktop tools: files, browser (WebDriver), web fetch, Excel, shell
//! - Integration with the Gemini API for LLM access
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Read a message at the prompt and pick a model tier for it
//! 2. Call the LLM with the conversation and available tools
//! 3. Execute any requested tool calls and feed the results back
//! 4. Repeat until the LLM answers or the iteration cap is reached
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use deskpilot::{agent::Session, llm::GeminiClient, Config};
//!
//! let config = Config::from_env()?;
//! let llm = Arc::new(GeminiClient::new(config.api_key.clone(), config.api_host.clone())?);
//! let mut session = Session::new(&config, llm);
//! let report = session.submit("List the files on my desktop").await?;
//! ```

pub mod agent;
pub mod config;
pub mod llm;
pub mod repl;
pub mod tools;

pub use config::Config;
