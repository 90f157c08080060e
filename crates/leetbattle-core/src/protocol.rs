// Wire protocol shared with the match server.
//
// Every WebSocket text frame carries one JSON envelope of the form
// `{"event": "<name>", "data": <payload>}`. Inbound frames decode into
// `ServerEvent`, outbound intents encode from `ClientMessage`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to decode server event: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode client message: {0}")]
    Encode(#[source] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

/// Identity the server assigned to this connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
}

/// Matchmaking queue state reported by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    #[default]
    Idle,
    Waiting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatusPayload {
    pub status: QueueStatus,
}

/// The problem both players race on. `starter_code` keeps its snake_case
/// wire name; it maps a language tag to the code the editor starts with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Problem {
    pub title: String,
    pub difficulty: String,
    pub statement: String,
    pub starter_code: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Payload of both `match.start` and its legacy alias `match.found`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStartPayload {
    pub match_id: String,
    #[serde(default)]
    pub problem: Problem,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    /// Older servers announce the initial countdown under this key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countdown_seconds: Option<u32>,
    /// Language assigned by the server for this round, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl MatchStartPayload {
    /// Seconds left at round start. `remaining` wins over the legacy key.
    pub fn initial_remaining(&self) -> Option<u32> {
        self.remaining.or(self.countdown_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerTick {
    pub remaining: u32,
}

/// Judge outcome for one submission.
///
/// The judge's vocabulary is open-ended; anything outside the known set is
/// kept verbatim in `Other` instead of failing the whole frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    RuntimeError,
    CompileError,
    TimeLimitExceeded,
    Other(String),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Verdict::Accepted => "Accepted",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::RuntimeError => "Runtime Error",
            Verdict::CompileError => "Compile Error",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
            Verdict::Other(s) => s,
        }
    }
}

impl From<String> for Verdict {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Accepted" => Verdict::Accepted,
            "Wrong Answer" => Verdict::WrongAnswer,
            "Runtime Error" => Verdict::RuntimeError,
            "Compile Error" | "Compilation Error" => Verdict::CompileError,
            "Time Limit Exceeded" => Verdict::TimeLimitExceeded,
            _ => Verdict::Other(s),
        }
    }
}

impl From<Verdict> for String {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one submission, replaced wholesale on every new result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub verdict: Verdict,
    #[serde(default)]
    pub pass_count: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub time_ms: u64,
    /// Opaque display text from the judge. Never parsed.
    #[serde(
        default,
        deserialize_with = "opaque_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<String>,
}

/// End-of-match summary. No `winner_id` means the clock ran out (draw).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    #[serde(default)]
    pub winner_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RematchStatus {
    pub ready_count: u32,
    pub total: u32,
}

/// One leaderboard row. The server sends rows already ranked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
}

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// Events pushed by the match server.
///
/// `MatchStart` and `MatchFound` carry the same payload and are folded into a
/// single "round started" transition by the reducer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "session")]
    Session(Session),
    #[serde(rename = "scoreboard.update")]
    ScoreboardUpdate(Vec<ScoreEntry>),
    #[serde(rename = "queue.status")]
    QueueStatus(QueueStatusPayload),
    #[serde(rename = "match.start")]
    MatchStart(MatchStartPayload),
    /// Legacy name for `match.start`.
    #[serde(rename = "match.found")]
    MatchFound(MatchStartPayload),
    #[serde(rename = "timer.tick")]
    TimerTick(TimerTick),
    #[serde(rename = "submission.result")]
    SubmissionResult(SubmissionResult),
    #[serde(rename = "match.over")]
    MatchOver(MatchSummary),
    #[serde(rename = "rematch.status")]
    RematchStatus(RematchStatus),
}

impl ServerEvent {
    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }

    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Session(_) => "session",
            ServerEvent::ScoreboardUpdate(_) => "scoreboard.update",
            ServerEvent::QueueStatus(_) => "queue.status",
            ServerEvent::MatchStart(_) => "match.start",
            ServerEvent::MatchFound(_) => "match.found",
            ServerEvent::TimerTick(_) => "timer.tick",
            ServerEvent::SubmissionResult(_) => "submission.result",
            ServerEvent::MatchOver(_) => "match.over",
            ServerEvent::RematchStatus(_) => "rematch.status",
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

/// Messages the client emits. None of them expects a direct reply; the
/// server answers later with ordinary `ServerEvent`s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "queue.join")]
    QueueJoin { name: String },
    #[serde(rename = "room.submit")]
    RoomSubmit {
        #[serde(rename = "matchId")]
        match_id: String,
        code: String,
        lang: String,
    },
    #[serde(rename = "rematch.request")]
    RematchRequest,
}

impl ClientMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::QueueJoin { .. } => "queue.join",
            ClientMessage::RoomSubmit { .. } => "room.submit",
            ClientMessage::RematchRequest => "rematch.request",
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Accept any JSON value for judge error text. Strings are kept verbatim,
/// anything else is kept as its JSON rendering, `null` becomes `None`.
fn opaque_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
