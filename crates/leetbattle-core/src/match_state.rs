// Client-visible match state: the snapshot the presentation layer reads.
//
// Only the reducer produces new `ClientState` values. Each phase carries
// exactly the data that is valid in it, so e.g. a match summary can only
// exist once the match is over.

use crate::protocol::{
    MatchSummary, Player, Problem, QueueStatus, RematchStatus, ScoreEntry, Session,
    SubmissionResult,
};

/// Language used to seed the editor and tag submissions when neither the
/// configuration nor the server picks one.
pub const DEFAULT_LANGUAGE: &str = "python";

/// Discrete phase of the client, derived from [`Round`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    Queued,
    InMatch,
    MatchOver,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Lobby => "lobby",
            Phase::Queued => "queued",
            Phase::InMatch => "in_match",
            Phase::MatchOver => "match_over",
        }
    }
}

/// How a finished match ended from this client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Won,
    Lost,
    /// Time expired with no winner.
    Draw,
}

/// One live or finished round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchState {
    pub match_id: String,
    pub problem: Problem,
    pub players: Vec<Player>,
    /// Seconds left, as last reported by the server. `None` until known.
    pub remaining: Option<u32>,
    pub last_result: Option<SubmissionResult>,
    /// Language the editor was seeded with; tags every submission.
    pub language: String,
}

/// Phase-specific state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Round {
    Lobby {
        queue: QueueStatus,
    },
    InMatch(MatchState),
    MatchOver {
        state: MatchState,
        over: MatchSummary,
        rematch: Option<RematchStatus>,
        /// Whether this client already voted for a rematch of this match.
        vote_cast: bool,
    },
}

impl Default for Round {
    fn default() -> Self {
        Round::Lobby {
            queue: QueueStatus::Idle,
        }
    }
}

/// Immutable snapshot of everything the client knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientState {
    pub connected: bool,
    pub session: Option<Session>,
    pub scoreboard: Vec<ScoreEntry>,
    pub round: Round,
    /// Editor buffer, seeded from the starter code at round start.
    pub editor: String,
    /// Preferred starter language when the server does not assign one.
    pub language: String,
}

impl Default for ClientState {
    fn default() -> Self {
        ClientState::new(DEFAULT_LANGUAGE)
    }
}

impl ClientState {
    pub fn new(language: impl Into<String>) -> Self {
        ClientState {
            connected: false,
            session: None,
            scoreboard: Vec::new(),
            round: Round::default(),
            editor: String::new(),
            language: language.into(),
        }
    }

    pub fn phase(&self) -> Phase {
        match &self.round {
            Round::Lobby {
                queue: QueueStatus::Idle,
            } => Phase::Lobby,
            Round::Lobby {
                queue: QueueStatus::Waiting,
            } => Phase::Queued,
            Round::InMatch(_) => Phase::InMatch,
            Round::MatchOver { .. } => Phase::MatchOver,
        }
    }

    pub fn queue_status(&self) -> QueueStatus {
        match &self.round {
            Round::Lobby { queue } => *queue,
            _ => QueueStatus::Idle,
        }
    }

    /// The current or just-finished match, if any.
    pub fn current_match(&self) -> Option<&MatchState> {
        match &self.round {
            Round::Lobby { .. } => None,
            Round::InMatch(state) | Round::MatchOver { state, .. } => Some(state),
        }
    }

    pub fn over(&self) -> Option<&MatchSummary> {
        match &self.round {
            Round::MatchOver { over, .. } => Some(over),
            _ => None,
        }
    }

    pub fn rematch_status(&self) -> Option<RematchStatus> {
        match &self.round {
            Round::MatchOver { rematch, .. } => *rematch,
            _ => None,
        }
    }

    pub fn self_user_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user_id.as_str())
    }

    /// Joining the queue needs a live connection and an idle lobby.
    pub fn can_join_queue(&self) -> bool {
        self.connected && self.phase() == Phase::Lobby
    }

    /// Submissions are only possible while the match is live.
    pub fn can_submit(&self) -> bool {
        self.phase() == Phase::InMatch
    }

    pub fn can_request_rematch(&self) -> bool {
        matches!(
            self.round,
            Round::MatchOver {
                vote_cast: false,
                ..
            }
        )
    }

    /// A rematch vote was sent and no new round has started yet.
    pub fn is_rematch_pending(&self) -> bool {
        matches!(self.round, Round::MatchOver { vote_cast: true, .. })
    }

    /// Outcome of the finished match, relative to this client's session.
    ///
    /// Without a known session a decided match counts as lost, since this
    /// client cannot be the recorded winner.
    pub fn outcome(&self) -> Option<Outcome> {
        let over = self.over()?;
        Some(match over.winner_id.as_deref() {
            None => Outcome::Draw,
            Some(winner) if Some(winner) == self.self_user_id() => Outcome::Won,
            Some(_) => Outcome::Lost,
        })
    }

    pub fn you_win(&self) -> bool {
        self.outcome() == Some(Outcome::Won)
    }
}
