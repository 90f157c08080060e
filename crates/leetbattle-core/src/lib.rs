// Realtime match client for Leet Battle.
//
// The connection manager keeps one websocket to the match server, the
// reducer folds server events into a `ClientState`, and `MatchClient`
// wires the two together behind a handle the UI can hold.

pub mod client;
pub mod config;
pub mod connection;
pub mod match_state;
pub mod protocol;
pub mod reducer;

pub use client::{ClientError, Intent, MatchClient};
pub use config::ClientConfig;
pub use match_state::{ClientState, Phase};
