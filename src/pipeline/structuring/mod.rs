//! Optional LLM summarization of assembled text.
//!
//! The oracle is untrusted: its answer is parsed field by field and
//! anything missing or mistyped falls back to a default.

pub mod chat;
pub mod ollama;
pub mod parser;
pub mod prompt;
pub mod types;

pub use chat::*;
pub use ollama::*;
pub use parser::*;
pub use prompt::*;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Oracle is not reachable at {0}")]
    Connection(String),

    #[error("Oracle returned error (status {status}): {body}")]
    Http { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("API key not set: environment variable {0} is empty or missing")]
    MissingApiKey(String),

    #[error("Failed to parse oracle response: {message}")]
    Malformed { message: String, raw: String },
}

impl OracleError {
    /// The oracle's answer text, when the failure was in reading it.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            OracleError::Malformed { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// Map a transport failure the same way for every HTTP oracle.
pub(crate) fn transport_error(e: reqwest::Error, base_url: &str, timeout_secs: u64) -> OracleError {
    if e.is_connect() {
        OracleError::Connection(base_url.to_string())
    } else if e.is_timeout() {
        OracleError::HttpClient(format!("Request timed out after {timeout_secs}s"))
    } else {
        OracleError::HttpClient(e.to_string())
    }
}
