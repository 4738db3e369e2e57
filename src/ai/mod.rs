//! Thin wrappers around an external language model.
//!
//! Nothing here ranks or scores donors. Requests are forwarded as prompts,
//! and the model's JSON reply is checked against the expected shape and
//! returned as-is.

pub mod client;
pub mod faq;
pub mod generations;
pub mod matcher;

use std::future::Future;
use std::time::Duration;

pub use client::{LlmClient, OpenAiClient, Prompt};
pub use faq::{ChatMessage, FaqAnswer, FaqQuery, Role};
pub use generations::MatchGenerations;
pub use matcher::{MatchForm, MatchRequest, MatchResponse, SuggestedDonor};

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI service is not configured")]
    NotConfigured,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("AI request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("AI service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed AI response: {0}")]
    Malformed(String),

    #[error("AI response does not match the expected schema: {0}")]
    Schema(String),

    #[error("AI request timed out")]
    Timeout,
}

/// Run an AI call with an overall deadline.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, AiError>
where
    F: Future<Output = Result<T, AiError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| AiError::Timeout)?
}
