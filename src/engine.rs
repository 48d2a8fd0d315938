//! Owns one typing session end to end: navigation, comparison, stats and
//! keystroke logs, plus the loader and the log sink they talk to.

use chrono::Local;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::compare::VerseComparator;
use crate::content::{ContentLoader, RangeSelector, TextUnit, UnitId};
use crate::event_log::{EventLogger, KeyInput, KeyKind};
use crate::hangul::is_syllable_block;
use crate::log_store::{VerseLogRecord, VerseLogSink};
use crate::session::{SessionError, SessionOptions, SessionPhase, SessionSeed, Transition, TypingSession};
use crate::stats::{StatsEngine, StatsSnapshot, StatusCounts};
use crate::typing_policy::BoundaryPolicy;
use crate::util::{mean, std_dev};

#[derive(Clone, Copy, Debug)]
pub struct EngineOptions {
    pub session: SessionOptions,
    /// Move on as soon as the active unit completes.
    pub auto_advance: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            session: SessionOptions::default(),
            auto_advance: true,
        }
    }
}

/// Result of feeding input to the active unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Update {
    pub complete: bool,
    pub transition: Option<Transition>,
}

#[derive(Clone, Debug, PartialEq)]
enum Origin {
    Range(RangeSelector),
    Units(Vec<TextUnit>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionSummary {
    pub stats: StatsSnapshot,
    pub units_typed: usize,
    pub mean_unit_accuracy: Option<f64>,
    pub unit_accuracy_std_dev: Option<f64>,
}

pub struct TypingEngine<L: ContentLoader, S: VerseLogSink> {
    session: TypingSession,
    stats: StatsEngine,
    events: EventLogger,
    loader: L,
    sink: S,
    session_id: String,
    auto_advance: bool,
    /// A completion whose advance was debounced; retried on the next tick.
    advance_owed: bool,
    submitted: HashSet<UnitId>,
    origin: Option<Origin>,
}

fn new_session_id() -> String {
    format!("{}-{:08x}", Local::now().format("%Y%m%dT%H%M%S"), rand::random::<u32>())
}

fn unit_accuracy(counts: StatusCounts) -> f64 {
    StatsSnapshot {
        total_typed: counts.typed,
        correct: counts.correct,
        errors: counts.incorrect,
        ..StatsSnapshot::default()
    }
    .accuracy()
}

impl<L: ContentLoader, S: VerseLogSink> TypingEngine<L, S> {
    pub fn new(loader: L, sink: S, policy: Box<dyn BoundaryPolicy>, options: EngineOptions) -> Self {
        Self {
            session: TypingSession::new(RangeSelector::new(1, 1, 1), policy, options.session),
            stats: StatsEngine::default(),
            events: EventLogger::new(),
            loader,
            sink,
            session_id: new_session_id(),
            auto_advance: options.auto_advance,
            advance_owed: false,
            submitted: HashSet::new(),
            origin: None,
        }
    }

    pub fn session(&self) -> &TypingSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut TypingSession {
        &mut self.session
    }

    pub fn events(&self) -> &EventLogger {
        &self.events
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_complete(&self) -> bool {
        self.session.is_complete()
    }

    pub fn active_comparator(&self) -> Option<&VerseComparator> {
        self.session.active_comparator()
    }

    pub fn open(&mut self, range: RangeSelector) -> Result<Transition, SessionError> {
        let totals = self.loader.range_stats(&range)?;
        let transition = self.session.open(&mut self.loader, range.clone())?;
        self.begin(totals.character_count, Origin::Range(range));
        Ok(transition)
    }

    /// Type an ad hoc collection (custom text, random verses).
    pub fn open_units(&mut self, units: Vec<TextUnit>) -> Transition {
        let total = units.iter().map(TextUnit::char_count).sum();
        let transition = self.session.start_units(units.clone());
        self.begin(total, Origin::Units(units));
        transition
    }

    pub fn resume(&mut self, range: RangeSelector, seed: SessionSeed) -> Result<Transition, SessionError> {
        let totals = self.loader.range_stats(&range)?;
        let transition = self.session.resume(&mut self.loader, range.clone(), seed)?;
        self.begin(totals.character_count, Origin::Range(range));
        Ok(transition)
    }

    /// Start the same selection over.
    pub fn retry(&mut self) -> Result<Transition, SessionError> {
        info!(session_id = %self.session_id, "retrying selection");
        match self.origin.clone() {
            Some(Origin::Range(range)) => self.open(range),
            Some(Origin::Units(units)) => Ok(self.open_units(units)),
            None => Ok(Transition::Unchanged),
        }
    }

    fn begin(&mut self, target_total: usize, origin: Origin) {
        self.session_id = new_session_id();
        self.events.clear_all();
        self.submitted.clear();
        self.advance_owed = false;
        self.stats.reset();
        self.stats.set_target_total(target_total);
        self.origin = Some(origin);
        self.start_logging_active();
        info!(session_id = %self.session_id, target_total, "session started");
    }

    /// Replace the active unit's input with a full snapshot.
    pub fn set_input(&mut self, text: &str, now: Instant) -> Result<Update, SessionError> {
        let Some(outcome) = self.session.input(text) else {
            return Ok(Update::default());
        };
        self.observe(now);

        let mut update = Update {
            complete: outcome.complete,
            transition: None,
        };
        if !outcome.complete {
            self.advance_owed = false;
        }
        if self.auto_advance && (outcome.just_completed || self.advance_owed) {
            update.transition = Some(self.advance_on_completion(now)?);
        }
        Ok(update)
    }

    /// One keystroke: logged against the expected part, then appended.
    pub fn type_char(&mut self, c: char, now: Instant) -> Result<Update, SessionError> {
        let Some(comparator) = self.session.active_comparator() else {
            return Ok(Update::default());
        };
        let (expected, position) = if is_syllable_block(c) {
            let index = comparator.typed().len();
            (comparator.expected_char(index), comparator.typed_part_count())
        } else {
            let position = comparator.typed_part_count();
            (comparator.expected_part(position), position)
        };
        let text = format!("{}{c}", comparator.input());

        self.log_key(KeyInput {
            kind: KeyKind::Input,
            char: Some(c),
            expected_char: expected,
            is_error: expected != Some(c),
            position,
        }, now);
        self.set_input(&text, now)
    }

    /// Multi-character burst; not keystrokes, so nothing is logged.
    pub fn paste(&mut self, text: &str, now: Instant) -> Result<Update, SessionError> {
        let input = format!("{}{text}", self.session.active_input());
        self.set_input(&input, now)
    }

    /// Delete the last character, or step back a unit when there is none.
    pub fn backspace(&mut self, now: Instant) -> Result<Update, SessionError> {
        let Some(comparator) = self.session.active_comparator() else {
            return Ok(Update::default());
        };
        let mut text = comparator.input().to_owned();
        if text.pop().is_none() {
            let transition = self.back(now)?;
            return Ok(Update {
                complete: false,
                transition: Some(transition),
            });
        }

        let position = comparator.typed_part_count().saturating_sub(1);
        let expected = comparator.expected_part(position);
        self.log_key(KeyInput {
            kind: KeyKind::Delete,
            char: None,
            expected_char: expected,
            is_error: false,
            position,
        }, now);
        self.set_input(&text, now)
    }

    /// Manual "next", whether or not the unit is complete.
    pub fn confirm(&mut self, now: Instant) -> Result<Transition, SessionError> {
        self.advance(now)
    }

    pub fn back(&mut self, now: Instant) -> Result<Transition, SessionError> {
        self.advance_owed = false;
        let transition = self.session.retreat(&mut self.loader)?;
        if matches!(transition, Transition::Moved { .. } | Transition::Loaded { .. }) {
            if self.stats.is_frozen() && self.snapshot().progress() < 100.0 {
                self.stats.thaw(now);
            }
            self.start_logging_active();
        }
        Ok(transition)
    }

    /// Advance on completion. A debounced attempt is owed, not dropped.
    fn advance_on_completion(&mut self, now: Instant) -> Result<Transition, SessionError> {
        let transition = self.advance(now)?;
        if transition == Transition::Debounced {
            debug!("auto-advance owed until the debounce window passes");
            self.advance_owed = true;
        }
        Ok(transition)
    }

    fn advance(&mut self, now: Instant) -> Result<Transition, SessionError> {
        let leaving = self.session.active_unit().map(|u| u.id);
        let transition = self.session.advance(&mut self.loader, now)?;
        if transition != Transition::Debounced {
            self.advance_owed = false;
        }

        match transition {
            Transition::Moved { .. } | Transition::Loaded { .. } => {
                if let Some(id) = leaving {
                    self.finalize(id);
                }
                self.start_logging_active();
            }
            Transition::Completed => {
                if let Some(id) = leaving {
                    self.finalize(id);
                }
                self.stats.freeze(now);
            }
            Transition::Unchanged | Transition::Debounced | Transition::Discarded => {}
        }
        Ok(transition)
    }

    pub fn tick(&mut self, now: Instant) -> StatsSnapshot {
        if self.advance_owed && matches!(self.session.phase(), SessionPhase::UnitComplete(_)) {
            if let Err(err) = self.advance(now) {
                warn!(error = %err, "owed auto-advance failed");
                self.advance_owed = false;
            }
        }
        self.stats.tick(now)
    }

    /// Stop the clock, e.g. while a dialog covers the text.
    pub fn freeze(&mut self, now: Instant) {
        self.stats.freeze(now);
    }

    pub fn thaw(&mut self, now: Instant) {
        if !self.session.is_complete() {
            self.stats.thaw(now);
        }
    }

    pub fn summary(&self) -> SessionSummary {
        let accuracies: Vec<f64> = self
            .session
            .status_streams()
            .map(|statuses| StatusCounts::tally([statuses]))
            .filter(|counts| counts.typed > 0)
            .map(unit_accuracy)
            .collect();

        SessionSummary {
            stats: self.stats.snapshot(),
            units_typed: accuracies.len(),
            mean_unit_accuracy: mean(&accuracies),
            unit_accuracy_std_dev: std_dev(&accuracies),
        }
    }

    fn observe(&mut self, now: Instant) {
        let counts = StatusCounts::tally(self.session.status_streams());
        self.stats.observe(counts, now);
    }

    fn log_key(&mut self, input: KeyInput, now: Instant) {
        if let Some(unit) = self.session.active_unit() {
            let event = self.events.append_event(unit.id, input, now);
            debug!(unit_id = event.unit_id, kind = %event.kind, is_error = event.is_error, "keystroke");
        }
    }

    fn start_logging_active(&mut self) {
        if let Some(unit) = self.session.active_unit() {
            self.events.start_logging(unit.id);
        }
    }

    /// Hand the unit's log to the sink. A failed submit keeps the events so a
    /// later pass can send them again.
    fn finalize(&mut self, unit_id: UnitId) {
        let Some(comparator) = self.session.comparator(unit_id) else {
            return;
        };
        let counts = StatusCounts::tally([comparator.statuses()]);
        let events = self.events.events(unit_id).to_vec();
        if events.is_empty() && (counts.typed == 0 || self.submitted.contains(&unit_id)) {
            return;
        }

        let time_spent = self.events.time_spent(unit_id);
        let secs = time_spent.as_secs_f64();
        let record = VerseLogRecord {
            session_id: self.session_id.clone(),
            unit_id,
            accuracy: unit_accuracy(counts),
            speed: if secs > 0.0 { counts.typed as f64 * 60.0 / secs } else { 0.0 },
            error_count: counts.incorrect,
            backspace_count: self.events.backspace_count(unit_id),
            time_spent_ms: time_spent.as_millis() as u64,
            events,
        };

        match self.sink.submit(&record) {
            Ok(()) => {
                debug!(unit_id, "verse log stored");
                self.events.clear(unit_id);
                self.submitted.insert(unit_id);
            }
            Err(err) => warn!(unit_id, error = %err, "failed to store verse log"),
        }
    }
}
