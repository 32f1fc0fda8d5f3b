//! Job kinds and the decks they declare.
//!
//! A job kind turns a typed payload into a [`Deck`]: the ordered slides,
//! their narration, and the static assets the templates reference. Decks
//! are plain data; the pipeline treats every slide the same way.

pub mod bank_insights;
pub mod credit_report;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::SlideSpec;

/// Which report a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    CreditReport,
    BankInsights,
}

impl ReportKind {
    pub const ALL: [ReportKind; 2] = [ReportKind::CreditReport, ReportKind::BankInsights];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreditReport => "credit-report",
            Self::BankInsights => "bank-insights",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| PayloadError::UnknownKind(s.to_string()))
    }
}

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("unknown report kind '{0}' (expected credit-report or bank-insights)")]
    UnknownKind(String),

    #[error("invalid {kind} payload: {source}")]
    Invalid {
        kind: ReportKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} payload has no {field}")]
    Missing { kind: ReportKind, field: &'static str },
}

/// A request to produce one video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub kind: ReportKind,
    /// Overrides the subject name found in the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub payload: serde_json::Value,
}

impl JobRequest {
    pub fn new(kind: ReportKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            name: None,
            payload,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Everything a job kind declares for one video.
#[derive(Debug, Clone, PartialEq)]
pub struct Deck {
    /// Subject name, used for the job directory.
    pub name: String,
    pub slides: Vec<SlideSpec>,
    /// Asset file names to stage into the job directory.
    pub assets: Vec<String>,
}

/// Build the deck for `request`.
///
/// `ready_timeout` bounds the wait for readiness selectors on motion slides.
pub fn build_deck(request: &JobRequest, ready_timeout: Duration) -> Result<Deck, PayloadError> {
    let mut deck = match request.kind {
        ReportKind::CreditReport => {
            let report = credit_report::CreditReport::from_value(&request.payload)?;
            credit_report::deck(&report)
        }
        ReportKind::BankInsights => {
            let insights = bank_insights::BankInsights::from_value(&request.payload)?;
            bank_insights::deck(&insights, ready_timeout)
        }
    };

    if let Some(name) = request.name.as_deref().filter(|n| !n.trim().is_empty()) {
        deck.name = name.to_string();
    }

    Ok(deck)
}

/// Spoken form of a payload value: strings as-is, everything else as JSON.
pub(crate) fn spoken(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
