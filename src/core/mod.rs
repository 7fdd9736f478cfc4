pub mod builtin_providers;
pub mod chat_completions;
pub mod chat_stream;
pub mod config;
pub mod controller;
pub mod delivery;
pub mod error;
pub mod message;
pub mod providers;
pub mod retry;
pub mod session_store;
pub mod settings;
pub mod snapshots;
pub mod storage;
