// Match state reducer.
//
// Every inbound event and every local intent is a pure function from one
// `ClientState` snapshot to the next. Events that do not fit the current
// phase leave the state untouched.

use std::mem;

use crate::match_state::{ClientState, MatchState, Phase, Round};
use crate::protocol::{
    ClientMessage, MatchStartPayload, MatchSummary, QueueStatus, RematchStatus, ScoreEntry,
    ServerEvent, Session, SubmissionResult,
};

/// Name sent when the player leaves the name field blank.
pub const DEFAULT_PLAYER_NAME: &str = "Player";

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// Fold one server event into the state.
pub fn apply(state: ClientState, event: ServerEvent) -> ClientState {
    match event {
        ServerEvent::Session(session) => on_session(state, session),
        ServerEvent::ScoreboardUpdate(rows) => on_scoreboard(state, rows),
        ServerEvent::QueueStatus(payload) => on_queue_status(state, payload.status),
        ServerEvent::MatchStart(payload) | ServerEvent::MatchFound(payload) => {
            round_started(state, payload)
        }
        ServerEvent::TimerTick(tick) => on_tick(state, tick.remaining),
        ServerEvent::SubmissionResult(result) => on_submission_result(state, result),
        ServerEvent::MatchOver(summary) => on_match_over(state, summary),
        ServerEvent::RematchStatus(status) => on_rematch_status(state, status),
    }
}

pub fn on_session(state: ClientState, session: Session) -> ClientState {
    ClientState {
        session: Some(session),
        ..state
    }
}

/// The server always sends the full ranked list; never merge.
pub fn on_scoreboard(state: ClientState, rows: Vec<ScoreEntry>) -> ClientState {
    ClientState {
        scoreboard: rows,
        ..state
    }
}

pub fn on_queue_status(mut state: ClientState, status: QueueStatus) -> ClientState {
    if let Round::Lobby { queue } = &mut state.round {
        *queue = status;
    }
    state
}

/// Canonical "round started" transition shared by `match.start` and
/// `match.found`.
///
/// Replaces the match wholesale, clears any result, summary and rematch
/// tally, and seeds the editor from the starter code of the round's
/// language. A second start while a round is live is a duplicate and is
/// dropped so it cannot reset the editor.
pub fn round_started(state: ClientState, payload: MatchStartPayload) -> ClientState {
    if state.phase() == Phase::InMatch {
        return state;
    }

    let language = payload
        .language
        .as_deref()
        .filter(|lang| !lang.is_empty())
        .unwrap_or(state.language.as_str())
        .to_string();
    let editor = payload
        .problem
        .starter_code
        .get(&language)
        .cloned()
        .unwrap_or_default();
    let remaining = payload.initial_remaining();

    let MatchStartPayload {
        match_id,
        problem,
        players,
        ..
    } = payload;

    ClientState {
        round: Round::InMatch(MatchState {
            match_id,
            problem,
            players,
            remaining,
            last_result: None,
            language,
        }),
        editor,
        ..state
    }
}

/// Ticks only matter while the round is live; late or early ticks are
/// dropped. The clock never moves back up within a round, so a stale or
/// duplicated tick with a larger value is ignored.
pub fn on_tick(mut state: ClientState, remaining: u32) -> ClientState {
    if let Round::InMatch(current) = &mut state.round {
        match current.remaining {
            Some(now) if remaining > now => {}
            _ => current.remaining = Some(remaining),
        }
    }
    state
}

pub fn on_submission_result(mut state: ClientState, result: SubmissionResult) -> ClientState {
    if let Round::InMatch(current) = &mut state.round {
        current.last_result = Some(result);
    }
    state
}

/// Ends the live round. A summary can only be attached once because the
/// round leaves `InMatch` here.
pub fn on_match_over(mut state: ClientState, summary: MatchSummary) -> ClientState {
    state.round = match mem::take(&mut state.round) {
        Round::InMatch(current) => Round::MatchOver {
            state: current,
            over: summary,
            rematch: None,
            vote_cast: false,
        },
        other => other,
    };
    state
}

pub fn on_rematch_status(mut state: ClientState, status: RematchStatus) -> ClientState {
    if let Round::MatchOver { rematch, .. } = &mut state.round {
        *rematch = Some(status);
    }
    state
}

// ---------------------------------------------------------------------------
// Transport events
// ---------------------------------------------------------------------------

pub fn on_connected(state: ClientState) -> ClientState {
    ClientState {
        connected: true,
        ..state
    }
}

/// A lost connection loses everything scoped to it: the session, the queue
/// slot and any match. The scoreboard is not match-scoped and is kept until
/// the server pushes a new one.
pub fn on_disconnected(state: ClientState) -> ClientState {
    ClientState {
        connected: false,
        session: None,
        round: Round::default(),
        editor: String::new(),
        ..state
    }
}

// ---------------------------------------------------------------------------
// Intents
// ---------------------------------------------------------------------------

/// Queue-join request, or `None` when not connected or not in the lobby.
pub fn join_queue(state: &ClientState, name: &str) -> Option<ClientMessage> {
    if !state.can_join_queue() {
        return None;
    }
    let name = if name.is_empty() {
        DEFAULT_PLAYER_NAME
    } else {
        name
    };
    Some(ClientMessage::QueueJoin {
        name: name.to_string(),
    })
}

/// Submission for the live round. Without explicit code the editor buffer
/// is submitted. `None` once the match is over.
pub fn submit(state: &ClientState, code: Option<&str>) -> Option<ClientMessage> {
    let Round::InMatch(current) = &state.round else {
        return None;
    };
    Some(ClientMessage::RoomSubmit {
        match_id: current.match_id.clone(),
        code: code.unwrap_or(state.editor.as_str()).to_string(),
        lang: current.language.clone(),
    })
}

/// Cast this client's rematch vote. Only one vote per finished match.
pub fn request_rematch(mut state: ClientState) -> (ClientState, Option<ClientMessage>) {
    let vote = match &mut state.round {
        Round::MatchOver { vote_cast, .. } if !*vote_cast => {
            *vote_cast = true;
            Some(ClientMessage::RematchRequest)
        }
        _ => None,
    };
    (state, vote)
}

/// Replace the editor buffer. Edits outside a live round are ignored.
pub fn edit_code(state: ClientState, code: String) -> ClientState {
    if state.phase() != Phase::InMatch {
        return state;
    }
    ClientState {
        editor: code,
        ..state
    }
}

/// Leave a finished match and go back to the lobby. Purely local; the
/// protocol has no message for it.
pub fn return_to_lobby(state: ClientState) -> ClientState {
    if state.phase() != Phase::MatchOver {
        return state;
    }
    ClientState {
        round: Round::default(),
        editor: String::new(),
        ..state
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
