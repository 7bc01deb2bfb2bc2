//! Rate-limits repeated warnings for malformed replication messages (§7:
//! "log once per minute per kind, keep the connection").
//!
//! A hostile or buggy server that sends a steady stream of truncated
//! packets shouldn't be able to flood the log; a genuinely new failure
//! mode should still surface immediately.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use bevy::prelude::Resource;

const THROTTLE_WINDOW: Duration = Duration::from_secs(60);

/// One entry per distinct error kind (see [`crate::error::ApplyError::kind`]),
/// so a flood of one failure mode doesn't suppress logging of another.
#[derive(Default, Resource)]
pub struct LogThrottle {
    last_logged: HashMap<&'static str, Instant>,
}

impl LogThrottle {
    /// Logs `message` under `kind` unless that kind was already logged
    /// within the last minute.
    pub fn warn(&mut self, kind: &'static str, message: impl std::fmt::Display) {
        let now = Instant::now();
        let should_log = match self.last_logged.get(kind) {
            Some(&last) => now.duration_since(last) >= THROTTLE_WINDOW,
            None => true,
        };
        if should_log {
            log::warn!("{message}");
            self.last_logged.insert(kind, now);
        }
    }
}
