use chrono::{DateTime, Utc};
use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Returned in place of real choices when legacy not-found rendering is enabled.
pub const LEGACY_PLACEHOLDER_CHOICES: [&str; 5] = ["some", "error", "happened", "^ ^", "LOL"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub id: i64,
    pub question: String,
    pub pub_date: DateTime<Utc>,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub id: i64,
    pub poll_id: i64,
    /// Zero-based index of the device token that feeds this choice.
    pub position: i64,
    pub text: String,
    pub votes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSummary {
    pub id: i64,
    pub question: String,
    pub pub_date: DateTime<Utc>,
}

/// Body of `POST /polls`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPoll {
    pub question: String,
    pub choices: Vec<String>,
}

impl NewPoll {
    /// Trimmed question and choice texts, or why the poll can't be stored.
    pub fn validated(&self) -> Result<(&str, Vec<&str>), Error> {
        let question = self.question.trim();
        if question.is_empty() {
            return Err(Error::InvalidPoll("question must not be empty".to_string()));
        }
        if self.choices.is_empty() {
            return Err(Error::InvalidPoll("a poll needs at least one choice".to_string()));
        }
        let choices: Vec<&str> = self.choices.iter().map(|c| c.trim()).collect();
        if let Some(position) = choices.iter().position(|c| c.is_empty()) {
            return Err(Error::InvalidPoll(format!("choice {} is empty", position)));
        }
        Ok((question, choices))
    }
}

/// One token of a device line, tagged with its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub position: usize,
    pub count: i64,
}

/// The `{choices, votes}` payload served to the results page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollVotes {
    pub choices: Vec<String>,
    pub votes: Vec<i64>,
}

impl PollVotes {
    pub fn legacy_placeholder() -> Self {
        Self {
            choices: LEGACY_PLACEHOLDER_CHOICES.iter().map(|s| s.to_string()).collect(),
            votes: Vec::new(),
        }
    }
}
