//! Langbase Pipes transport for the reasoning engine.

mod client;
mod types;


pub use client::LangbaseClient;
pub use types::*;
