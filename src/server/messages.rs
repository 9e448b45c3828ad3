//! # Internal Messages Module
//!
//! Types exchanged between the game session and the event tree of the server.
//!
//! ## Message Types
//! - [`Outgoing`]: an event produced by the session, with its [`Target`].
//! - [`GameResult`]: outcome reported when the server stops.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{
    checkers::Player,
    events::{Event, EventData, Path},
};

/// Name of the sub-manager of a connection
pub fn client_name(id: u32) -> String {
    format!("client_{id}")
}

/// Connection id from a sub-manager name
pub fn client_id(name: &str) -> Option<u32> {
    name.strip_prefix("client_")?.parse().ok()
}

/// Recipients of an outgoing event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every connected client, in connection order
    All,
    /// A single connection
    Client(u32),
}

impl Target {
    /// Manager on which the event is raised
    pub fn path(&self) -> Path {
        match self {
            Target::All => Vec::new(),
            Target::Client(id) => vec![client_name(*id)],
        }
    }
}

/// Event produced by the game session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub target: Target,
    pub event: Event,
}

impl Outgoing {
    pub fn all(name: &str, data: EventData) -> Self {
        Self {
            target: Target::All,
            event: Event::new(name, data),
        }
    }

    pub fn to(id: u32, name: &str, data: EventData) -> Self {
        Self {
            target: Target::Client(id),
            event: Event::new(name, data),
        }
    }
}

/// Outcome of a hosted game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    /// `None` when the game stopped without a winner
    pub winner: Option<Player>,
    pub total_turns: usize,
}

impl Display for GameResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.winner {
            Some(winner) => write!(f, "{winner} won after {} turns", self.total_turns),
            None => write!(f, "No winner after {} turns", self.total_turns),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_names() {
        assert_eq!(client_name(3), "client_3");
        assert_eq!(client_id("client_3"), Some(3));
        assert_eq!(client_id("client_x"), None);
        assert_eq!(client_id("game"), None);
        assert_eq!(Target::Client(7).path(), vec!["client_7".to_string()]);
        assert!(Target::All.path().is_empty());
    }
}
