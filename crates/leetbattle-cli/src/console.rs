// Console commands and plain-text rendering of client state.
//
// Parsing is pure so it can be tested without stdin; rendering compares two
// snapshots and describes what changed, one short line per change.

use std::path::PathBuf;

use leetbattle_core::match_state::{ClientState, Outcome, Phase};

pub const HELP: &str = "\
commands:
  join [name]     join the matchmaking queue
  submit [path]   submit the editor buffer, or the contents of a file
  edit <path>     load a file into the editor
  rematch         vote for a rematch
  lobby           leave a finished match
  status          print the current state
  help            show this help
  quit            disconnect and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Join(Option<String>),
    Submit(Option<PathBuf>),
    Edit(PathBuf),
    Rematch,
    Lobby,
    Status,
    Help,
    Quit,
}

/// Parse one input line. `Ok(None)` for a blank line, `Err` with a message
/// for anything unrecognised.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let arg = (!rest.is_empty()).then(|| rest.to_string());

    let cmd = match word.to_ascii_lowercase().as_str() {
        "join" | "j" => ConsoleCommand::Join(arg),
        "submit" | "s" => ConsoleCommand::Submit(arg.map(PathBuf::from)),
        "edit" | "e" => match arg {
            Some(path) => ConsoleCommand::Edit(PathBuf::from(path)),
            None => return Err("usage: edit <path>".into()),
        },
        "rematch" | "r" => ConsoleCommand::Rematch,
        "lobby" | "l" => ConsoleCommand::Lobby,
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command `{other}` (try `help`)")),
    };
    Ok(Some(cmd))
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Lines describing the transition from `prev` to `next`.
pub fn describe_changes(prev: &ClientState, next: &ClientState) -> Vec<String> {
    let mut lines = Vec::new();

    if prev.connected != next.connected {
        lines.push(if next.connected {
            "connected".to_string()
        } else {
            "disconnected".to_string()
        });
    }

    if prev.session != next.session {
        if let Some(id) = next.self_user_id() {
            lines.push(format!("signed in as {id}"));
        }
    }

    if prev.scoreboard != next.scoreboard && !next.scoreboard.is_empty() {
        lines.extend(scoreboard_lines(next));
    }

    let phase = next.phase();
    let same_match = prev.current_match().map(|m| &m.match_id)
        == next.current_match().map(|m| &m.match_id);

    if prev.phase() != phase || !same_match {
        match phase {
            Phase::Lobby => lines.push("in lobby".into()),
            Phase::Queued => lines.push("waiting for an opponent...".into()),
            Phase::InMatch => {
                if let Some(current) = next.current_match() {
                    let title = if current.problem.title.is_empty() {
                        "untitled problem"
                    } else {
                        current.problem.title.as_str()
                    };
                    lines.push(format!(
                        "match {} started: {} ({})",
                        current.match_id, title, current.language
                    ));
                }
            }
            Phase::MatchOver => lines.push(match next.outcome() {
                Some(Outcome::Won) => "match over: you win".into(),
                Some(Outcome::Lost) => "match over: you lose".into(),
                _ => "match over: draw".into(),
            }),
        }
    }

    if let (Some(before), Some(after)) = (prev.current_match(), next.current_match()) {
        if same_match {
            if before.remaining != after.remaining {
                if let Some(secs) = after.remaining.filter(|s| s % 30 == 0 || *s <= 10) {
                    lines.push(format!("{} left", format_clock(secs)));
                }
            }
            if before.last_result != after.last_result {
                if let Some(result) = &after.last_result {
                    let mut line = format!(
                        "{}: {}/{} passed in {} ms",
                        result.verdict, result.pass_count, result.total, result.time_ms
                    );
                    if let Some(error) = &result.error {
                        line.push_str(&format!("\n  {error}"));
                    }
                    lines.push(line);
                }
            }
        }
    }

    if !prev.is_rematch_pending() && next.is_rematch_pending() {
        lines.push("rematch requested".into());
    }
    if prev.rematch_status() != next.rematch_status() {
        if let Some(status) = next.rematch_status() {
            lines.push(format!("rematch: {}/{} ready", status.ready_count, status.total));
        }
    }

    lines
}

/// Full description for the `status` command.
pub fn status_lines(state: &ClientState) -> Vec<String> {
    let link = if state.connected {
        "connected"
    } else {
        "disconnected"
    };
    let mut lines = vec![format!(
        "{} | phase: {} | user: {}",
        link,
        state.phase().as_str(),
        state.self_user_id().unwrap_or("-"),
    )];

    if let Some(current) = state.current_match() {
        lines.push(format!(
            "match {} | {} | {} | time left: {}",
            current.match_id,
            current.problem.title,
            current.language,
            current.remaining.map_or_else(|| "-".to_string(), format_clock),
        ));
        let names: Vec<&str> = current
            .players
            .iter()
            .map(|p| p.name.as_deref().unwrap_or(p.user_id.as_str()))
            .collect();
        if !names.is_empty() {
            lines.push(format!("players: {}", names.join(" vs ")));
        }
        lines.push(format!("editor: {} lines", state.editor.lines().count()));
    }

    if let Some(status) = state.rematch_status() {
        lines.push(format!("rematch: {}/{} ready", status.ready_count, status.total));
    }

    lines.extend(scoreboard_lines(state));
    lines
}

fn scoreboard_lines(state: &ClientState) -> Vec<String> {
    state
        .scoreboard
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let name = if row.name.is_empty() {
                &row.user_id
            } else {
                &row.name
            };
            format!("  {:>2}. {:<16} {}W {}L", i + 1, name, row.wins, row.losses)
        })
        .collect()
}

fn format_clock(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use leetbattle_core::protocol::{MatchStartPayload, MatchSummary, ServerEvent, Session};
    use leetbattle_core::reducer;

    fn payload(match_id: &str) -> MatchStartPayload {
        serde_json::from_value(serde_json::json!({
            "matchId": match_id,
            "problem": { "title": "Two Sum", "starter_code": { "python": "pass" } },
            "players": [{ "userId": "u1", "name": "Ann" }, { "userId": "u2" }],
            "remaining": 90
        }))
        .unwrap()
    }

    fn in_match() -> ClientState {
        let state = reducer::on_connected(ClientState::default());
        let state = reducer::on_session(
            state,
            Session {
                user_id: "u1".into(),
            },
        );
        reducer::round_started(state, payload("m1"))
    }

    // -- Parsing --

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn join_with_and_without_name() {
        assert_eq!(parse_command("join"), Ok(Some(ConsoleCommand::Join(None))));
        assert_eq!(
            parse_command("join  Ann Lee "),
            Ok(Some(ConsoleCommand::Join(Some("Ann Lee".into()))))
        );
    }

    #[test]
    fn submit_takes_optional_path() {
        assert_eq!(parse_command("submit"), Ok(Some(ConsoleCommand::Submit(None))));
        assert_eq!(
            parse_command("s sol.py"),
            Ok(Some(ConsoleCommand::Submit(Some(PathBuf::from("sol.py")))))
        );
    }

    #[test]
    fn edit_requires_path() {
        assert!(parse_command("edit").is_err());
        assert_eq!(
            parse_command("EDIT sol.py"),
            Ok(Some(ConsoleCommand::Edit(PathBuf::from("sol.py"))))
        );
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse_command("rematch"), Ok(Some(ConsoleCommand::Rematch)));
        assert_eq!(parse_command("lobby"), Ok(Some(ConsoleCommand::Lobby)));
        assert_eq!(parse_command("status"), Ok(Some(ConsoleCommand::Status)));
        assert_eq!(parse_command("?"), Ok(Some(ConsoleCommand::Help)));
        assert_eq!(parse_command("q"), Ok(Some(ConsoleCommand::Quit)));
    }

    #[test]
    fn unknown_command_is_an_error() {
        let err = parse_command("dance").unwrap_err();
        assert!(err.contains("dance"));
    }

    // -- Rendering --

    #[test]
    fn connect_and_session_are_reported() {
        let prev = ClientState::default();
        let next = reducer::on_session(
            reducer::on_connected(prev.clone()),
            Session {
                user_id: "u1".into(),
            },
        );
        let lines = describe_changes(&prev, &next);
        assert_eq!(lines, vec!["connected", "signed in as u1"]);
    }

    #[test]
    fn round_start_is_reported_once() {
        let prev = reducer::on_connected(ClientState::default());
        let next = reducer::round_started(prev.clone(), payload("m1"));
        assert_eq!(
            describe_changes(&prev, &next),
            vec!["match m1 started: Two Sum (python)"]
        );
        assert!(describe_changes(&next, &next).is_empty());
    }

    #[test]
    fn only_notable_ticks_are_reported() {
        let prev = in_match();
        let next = reducer::on_tick(prev.clone(), 89);
        assert!(describe_changes(&prev, &next).is_empty());

        let later = reducer::on_tick(next.clone(), 60);
        assert_eq!(describe_changes(&next, &later), vec!["1:00 left"]);
    }

    #[test]
    fn match_over_reports_outcome() {
        let prev = in_match();
        let won = reducer::on_match_over(
            prev.clone(),
            MatchSummary {
                winner_id: Some("u1".into()),
            },
        );
        assert_eq!(describe_changes(&prev, &won), vec!["match over: you win"]);

        let draw = reducer::apply(
            prev.clone(),
            ServerEvent::MatchOver(MatchSummary { winner_id: None }),
        );
        assert_eq!(describe_changes(&prev, &draw), vec!["match over: draw"]);
    }

    #[test]
    fn status_lists_match_and_players() {
        let lines = status_lines(&in_match());
        assert_eq!(lines[0], "connected | phase: in_match | user: u1");
        assert!(lines[1].starts_with("match m1 | Two Sum | python | time left: 1:30"));
        assert_eq!(lines[2], "players: Ann vs u2");
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(0), "0:00");
        assert_eq!(format_clock(125), "2:05");
    }
}
