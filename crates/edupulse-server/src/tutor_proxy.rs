//! Tutor Proxy - forwards tutoring conversations to the AI tutor service
//!
//! The tutor service is an external HTTP backend. This server owns auth,
//! consent checks and persistence; the upstream only sees the subject and
//! the conversation so far.

use crate::error::ApiError;
use crate::models::{MessageSender, TutoringMessage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Upper bound on history sent upstream
pub const MAX_HISTORY: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TutorTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorRequest {
    pub session_id: String,
    pub subject: String,
    pub messages: Vec<TutorTurn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorReply {
    pub reply: String,
}

pub struct TutorProxy {
    pub base_url: String,
    client: Client,
}

impl TutorProxy {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    pub async fn respond(&self, request: &TutorRequest) -> Result<TutorReply, ApiError> {
        let url = format!("{}/v1/tutor/respond", self.base_url);
        debug!(session = %request.session_id, "Forwarding tutoring turn to {}", url);

        let resp = self.client.post(&url).json(request).send().await.map_err(|e| {
            if e.is_connect() {
                warn!("Tutor service not reachable at {}: {}", self.base_url, e);
                ApiError::BadGateway("Tutor service not available".to_string())
            } else if e.is_timeout() {
                warn!("Request to tutor service timed out: {}", e);
                ApiError::BadGateway("Tutor service timeout".to_string())
            } else {
                error!("Failed to reach tutor service: {}", e);
                ApiError::BadGateway("Tutor service error".to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            warn!("Tutor service returned status: {}", status);
            return Err(ApiError::BadGateway(format!(
                "Tutor service returned status {}",
                status.as_u16()
            )));
        }

        let reply: TutorReply = resp.json().await.map_err(|e| {
            error!("Invalid tutor service response: {}", e);
            ApiError::BadGateway("Invalid tutor service response".to_string())
        })?;

        if reply.reply.trim().is_empty() {
            return Err(ApiError::BadGateway("Tutor returned an empty reply".to_string()));
        }
        Ok(reply)
    }

    pub async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Map stored messages to upstream turns, keeping the most recent ones
pub fn build_history(messages: &[TutoringMessage]) -> Vec<TutorTurn> {
    let start = messages.len().saturating_sub(MAX_HISTORY);
    messages[start..]
        .iter()
        .map(|m| TutorTurn {
            role: match m.sender {
                MessageSender::Student => "user".to_string(),
                MessageSender::Tutor => "assistant".to_string(),
            },
            content: m.content.clone(),
        })
        .collect()
}

/// History for a question that is not stored yet
pub fn history_with_question(messages: &[TutoringMessage], question: &str) -> Vec<TutorTurn> {
    let mut turns = build_history(messages);
    turns.push(TutorTurn {
        role: "user".to_string(),
        content: question.to_string(),
    });
    let excess = turns.len().saturating_sub(MAX_HISTORY);
    turns.drain(..excess);
    turns
}
