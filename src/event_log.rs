use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::content::UnitId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KeyKind {
    Input,
    Delete,
}

impl KeyKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "input" => Some(Self::Input),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// What the input handler knows about a keystroke before it is timed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyInput {
    pub kind: KeyKind,
    pub char: Option<char>,
    pub expected_char: Option<char>,
    pub is_error: bool,
    pub position: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystrokeEvent {
    pub unit_id: UnitId,
    pub kind: KeyKind,
    pub char: Option<char>,
    pub expected_char: Option<char>,
    pub is_error: bool,
    pub position: usize,
    pub duration_since_last_ms: u64,
}

#[derive(Clone, Debug, Default)]
struct UnitLog {
    events: Vec<KeystrokeEvent>,
    started_at: Option<Instant>,
    last_at: Option<Instant>,
    backspace_count: usize,
}

/// Append-only keystroke log per unit, drained once the unit's log is stored.
#[derive(Debug, Default)]
pub struct EventLogger {
    units: HashMap<UnitId, UnitLog>,
}

impl EventLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: an existing log for `unit_id` is left as is.
    pub fn start_logging(&mut self, unit_id: UnitId) {
        self.units.entry(unit_id).or_default();
    }

    pub fn append_event(&mut self, unit_id: UnitId, input: KeyInput, now: Instant) -> &KeystrokeEvent {
        let log = self.units.entry(unit_id).or_default();
        let started_at = *log.started_at.get_or_insert(now);
        let previous = log.last_at.unwrap_or(started_at);
        let duration = now.saturating_duration_since(previous);

        log.last_at = Some(now);
        if input.kind == KeyKind::Delete {
            log.backspace_count += 1;
        }

        log.events.push(KeystrokeEvent {
            unit_id,
            kind: input.kind,
            char: input.char,
            expected_char: input.expected_char,
            is_error: input.is_error,
            position: input.position,
            duration_since_last_ms: duration.as_millis() as u64,
        });
        &log.events[log.events.len() - 1]
    }

    pub fn events(&self, unit_id: UnitId) -> &[KeystrokeEvent] {
        self.units.get(&unit_id).map_or(&[][..], |log| log.events.as_slice())
    }

    pub fn backspace_count(&self, unit_id: UnitId) -> usize {
        self.units.get(&unit_id).map_or(0, |log| log.backspace_count)
    }

    /// Time between the first and the latest event of the unit.
    pub fn time_spent(&self, unit_id: UnitId) -> Duration {
        match self.units.get(&unit_id) {
            Some(UnitLog {
                started_at: Some(start),
                last_at: Some(last),
                ..
            }) => last.saturating_duration_since(*start),
            _ => Duration::ZERO,
        }
    }

    pub fn error_count(&self, unit_id: UnitId) -> usize {
        self.events(unit_id).iter().filter(|e| e.is_error).count()
    }

    pub fn clear(&mut self, unit_id: UnitId) {
        self.units.remove(&unit_id);
    }

    pub fn clear_all(&mut self) {
        self.units.clear();
    }
}
