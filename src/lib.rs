//! chatline is a terminal chat client for OpenAI-compatible LLM gateways.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the delivery pipeline (provider adapters, retry policy,
//!   streaming decoder), the conversation controller, and durable session,
//!   settings and snapshot storage.
//! - [`commands`] implements slash-command parsing used by the chat loop.
//! - [`api`] defines the chat-completions wire payloads.
//! - [`utils`] holds request helpers.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which loads configuration and dispatches
//! into the interactive loop or a one-shot command.

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod utils;
