//! Navigation state machine over verses, pages and chapters.
//!
//! ```text
//! Idle ──open/seed──▶ Active(i) ──input completes──▶ UnitComplete(i)
//! Active(i) ──advance──▶ Active(i+1)
//!           ──advance at page end──▶ PageBoundary ──loaded──▶ Active(0)
//!           ──advance at chapter end──▶ ChapterBoundary ──loaded──▶ Active(0)
//!           ──advance at range end──▶ SessionComplete
//! ```
//!
//! Page loads are two-phase so they can run off the input thread:
//! [`TypingSession::begin_advance`] hands out a [`LoadRequest`] ticket and
//! [`TypingSession::complete_load`] applies the result only if that ticket is
//! still the one in flight. A failed load leaves the cursor where it was.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::compare::{CompareOutcome, Status, VerseComparator};
use crate::content::{ContentLoader, LoadError, Page, PageIndex, RangeSelector, TextUnit, UnitId};
use crate::typing_policy::BoundaryPolicy;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionCursor {
    pub active_unit_index: usize,
    pub page: u32,
    pub chapter: u32,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum SessionPhase {
    Idle,
    Active(usize),
    UnitComplete(usize),
    PageBoundary,
    ChapterBoundary,
    SessionComplete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadTarget {
    NextPage,
    PrevPage,
    Chapter { chapter: u32, page: PageIndex },
}

/// Ticket for one in-flight page load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadRequest {
    ticket: u64,
    pub target: LoadTarget,
    pub direction: Direction,
}

impl LoadRequest {
    /// Run the load against `loader` using a snapshot of the session's
    /// selection and cursor.
    pub fn run<L: ContentLoader + ?Sized>(
        &self,
        loader: &mut L,
        range: &RangeSelector,
        cursor: &SessionCursor,
    ) -> Result<Page, LoadError> {
        match self.target {
            LoadTarget::NextPage => loader.load_next_page(range, cursor),
            LoadTarget::PrevPage => loader.load_prev_page(range, cursor),
            LoadTarget::Chapter { chapter, page } => loader.load_page(range, chapter, page),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Ready(Transition),
    Load(LoadRequest),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Moved { index: usize },
    Loaded { chapter: u32, page: u32, index: usize },
    Completed,
    Unchanged,
    Debounced,
    /// The load result arrived for a ticket that was cancelled or superseded.
    Discarded,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("a page load is already in flight")]
    Busy,

    #[error("loaded page has no units")]
    EmptyPage,

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// External coordinates to resume a previous pass from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionSeed {
    pub chapter: u32,
    pub page: u32,
    pub unit_id: Option<UnitId>,
}

#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    pub advance_debounce: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            advance_debounce: Duration::from_millis(250),
        }
    }
}

type CompletionCallback = Box<dyn FnMut() + Send>;

/// Single owner of the cursor and of every visited unit's status stream.
pub struct TypingSession {
    range: RangeSelector,
    units: Vec<TextUnit>,
    cursor: SessionCursor,
    phase: SessionPhase,
    visited: HashMap<UnitId, VerseComparator>,
    policy: Box<dyn BoundaryPolicy>,
    options: SessionOptions,
    last_advance_at: Option<Instant>,
    pending: Option<LoadRequest>,
    next_ticket: u64,
    completion_notified: bool,
    on_complete: Option<CompletionCallback>,
    /// Units came from the loader, so navigation may fall through to pages
    /// and chapters.
    paged: bool,
}

impl TypingSession {
    pub fn new(range: RangeSelector, policy: Box<dyn BoundaryPolicy>, options: SessionOptions) -> Self {
        let cursor = SessionCursor {
            chapter: range.chapter_start,
            page: 1,
            ..SessionCursor::default()
        };
        Self {
            range,
            units: Vec::new(),
            cursor,
            phase: SessionPhase::Idle,
            visited: HashMap::new(),
            policy,
            options,
            last_advance_at: None,
            pending: None,
            next_ticket: 0,
            completion_notified: false,
            on_complete: None,
            paged: false,
        }
    }

    /// Invoked once, the first time the session reaches `SessionComplete`.
    pub fn on_complete<F: FnMut() + Send + 'static>(&mut self, callback: F) {
        self.on_complete = Some(Box::new(callback));
    }

    pub fn range(&self) -> &RangeSelector {
        &self.range
    }

    pub fn cursor(&self) -> &SessionCursor {
        &self.cursor
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn units(&self) -> &[TextUnit] {
        &self.units
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.phase == SessionPhase::SessionComplete
    }

    pub fn active_index(&self) -> Option<usize> {
        (!self.units.is_empty()).then_some(self.cursor.active_unit_index)
    }

    pub fn active_unit(&self) -> Option<&TextUnit> {
        self.units.get(self.cursor.active_unit_index)
    }

    pub fn comparator(&self, id: UnitId) -> Option<&VerseComparator> {
        self.visited.get(&id)
    }

    pub fn active_comparator(&self) -> Option<&VerseComparator> {
        self.active_unit().and_then(|unit| self.visited.get(&unit.id))
    }

    pub fn active_input(&self) -> &str {
        self.active_comparator().map_or("", |c| c.input())
    }

    /// Status streams of every unit typed into since the selection was opened.
    pub fn status_streams(&self) -> impl Iterator<Item = &[Status]> + '_ {
        self.visited.values().map(|c| c.statuses())
    }

    /// Replace the whole selection and load its first page.
    pub fn open<L: ContentLoader + ?Sized>(
        &mut self,
        loader: &mut L,
        range: RangeSelector,
    ) -> Result<Transition, SessionError> {
        let page = loader.load_units(&range)?;
        let index = range
            .start_verse
            .and_then(|verse| page.units.iter().position(|u| u.number == verse))
            .unwrap_or(0);

        self.range = range;
        self.restart_selection();
        info!(
            book_id = self.range.book_id,
            chapter_start = self.range.chapter_start,
            chapter_end = self.range.chapter_end,
            "opened selection"
        );
        self.install(page, index)
    }

    /// Seed the cursor from previously saved coordinates.
    pub fn resume<L: ContentLoader + ?Sized>(
        &mut self,
        loader: &mut L,
        range: RangeSelector,
        seed: SessionSeed,
    ) -> Result<Transition, SessionError> {
        let chapter = seed.chapter.max(range.chapter_start).min(range.chapter_end);
        let page = loader.load_page(&range, chapter, PageIndex::Number(seed.page.max(1)))?;
        let index = seed
            .unit_id
            .and_then(|id| page.units.iter().position(|u| u.id == id))
            .unwrap_or(0);

        self.range = range;
        self.restart_selection();
        info!(chapter, page = page.page, index, "resumed session");
        self.install(page, index)
    }

    /// Swap in a collection from outside the loader (custom text, random
    /// verses). A different first unit means a different collection, which
    /// always restarts at the first unit.
    pub fn replace_units(&mut self, units: Vec<TextUnit>) -> Transition {
        let swapped = self.units.first().map(|u| u.id) != units.first().map(|u| u.id);
        let index = if swapped {
            self.cancel_pending();
            self.visited.clear();
            self.completion_notified = false;
            0
        } else {
            self.cursor.active_unit_index.min(units.len().saturating_sub(1))
        };

        self.units = units;
        self.paged = false;
        self.cursor.active_unit_index = index;
        self.cursor.has_next_page = false;
        self.cursor.has_prev_page = false;
        self.phase = if self.units.is_empty() {
            SessionPhase::Idle
        } else {
            SessionPhase::Active(index)
        };
        self.touch_active();
        Transition::Moved { index }
    }

    /// Start a fresh selection over `units`, dropping everything visited.
    pub fn start_units(&mut self, units: Vec<TextUnit>) -> Transition {
        self.restart_selection();
        self.units.clear();
        self.replace_units(units)
    }

    pub fn activate(&mut self, index: usize) -> usize {
        if self.units.is_empty() {
            return 0;
        }
        let clamped = index.min(self.units.len() - 1);
        self.cursor.active_unit_index = clamped;
        self.phase = SessionPhase::Active(clamped);
        self.touch_active();
        debug!(requested = index, applied = clamped, "activated unit");
        clamped
    }

    /// Feed the active unit's full input snapshot.
    pub fn input(&mut self, text: &str) -> Option<CompareOutcome> {
        let index = self.cursor.active_unit_index;
        let unit = self.units.get(index)?;
        if matches!(
            self.phase,
            SessionPhase::PageBoundary | SessionPhase::ChapterBoundary | SessionPhase::SessionComplete
        ) {
            return None;
        }

        let comparator = self
            .visited
            .entry(unit.id)
            .or_insert_with(|| VerseComparator::new(&unit.text));
        let outcome = comparator.update(text, self.policy.as_ref());

        self.phase = if outcome.complete {
            SessionPhase::UnitComplete(index)
        } else {
            SessionPhase::Active(index)
        };
        Some(outcome)
    }

    pub fn clear_active_input(&mut self) {
        if let Some(unit) = self.units.get(self.cursor.active_unit_index) {
            if let Some(comparator) = self.visited.get_mut(&unit.id) {
                comparator.reset();
            }
        }
    }

    pub fn begin_advance(&mut self, now: Instant) -> Result<Step, SessionError> {
        if self.pending.is_some() {
            return Err(SessionError::Busy);
        }
        if self.units.is_empty() || self.is_complete() {
            return Ok(Step::Ready(Transition::Unchanged));
        }
        if let Some(last) = self.last_advance_at {
            if now.saturating_duration_since(last) < self.options.advance_debounce {
                debug!("suppressed repeated advance");
                return Ok(Step::Ready(Transition::Debounced));
            }
        }
        self.last_advance_at = Some(now);

        let next = self.cursor.active_unit_index + 1;
        if next < self.units.len() {
            self.activate(next);
            return Ok(Step::Ready(Transition::Moved { index: next }));
        }

        if self.cursor.has_next_page {
            self.phase = SessionPhase::PageBoundary;
            return Ok(Step::Load(self.request(LoadTarget::NextPage, Direction::Forward)));
        }

        if self.paged && self.cursor.chapter < self.range.chapter_end {
            self.phase = SessionPhase::ChapterBoundary;
            let target = LoadTarget::Chapter {
                chapter: self.cursor.chapter + 1,
                page: PageIndex::Number(1),
            };
            return Ok(Step::Load(self.request(target, Direction::Forward)));
        }

        self.phase = SessionPhase::SessionComplete;
        if !self.completion_notified {
            self.completion_notified = true;
            info!(chapter = self.cursor.chapter, "session complete");
            if let Some(callback) = self.on_complete.as_mut() {
                callback();
            }
        }
        Ok(Step::Ready(Transition::Completed))
    }

    pub fn begin_retreat(&mut self) -> Result<Step, SessionError> {
        if self.pending.is_some() {
            return Err(SessionError::Busy);
        }
        if self.units.is_empty() {
            return Ok(Step::Ready(Transition::Unchanged));
        }

        let index = self.cursor.active_unit_index;
        if self.is_complete() {
            self.activate(index);
            return Ok(Step::Ready(Transition::Moved { index }));
        }
        if index > 0 {
            self.activate(index - 1);
            return Ok(Step::Ready(Transition::Moved { index: index - 1 }));
        }

        if self.cursor.has_prev_page {
            self.phase = SessionPhase::PageBoundary;
            return Ok(Step::Load(self.request(LoadTarget::PrevPage, Direction::Backward)));
        }

        if self.paged && self.cursor.chapter > self.range.chapter_start {
            self.phase = SessionPhase::ChapterBoundary;
            let target = LoadTarget::Chapter {
                chapter: self.cursor.chapter - 1,
                page: PageIndex::Last,
            };
            return Ok(Step::Load(self.request(target, Direction::Backward)));
        }

        Ok(Step::Ready(Transition::Unchanged))
    }

    /// Apply the result of a load started by `begin_advance`/`begin_retreat`.
    pub fn complete_load(
        &mut self,
        request: LoadRequest,
        result: Result<Page, LoadError>,
    ) -> Result<Transition, SessionError> {
        if self.pending.map(|p| p.ticket) != Some(request.ticket) {
            debug!(ticket = request.ticket, "discarding stale page load");
            return Ok(Transition::Discarded);
        }
        self.pending = None;

        let page = match result {
            Ok(page) if !page.units.is_empty() => page,
            Ok(_) => {
                self.restore_active();
                return Err(SessionError::EmptyPage);
            }
            Err(err) => {
                warn!(error = %err, target = ?request.target, "page load failed");
                self.restore_active();
                return Err(err.into());
            }
        };

        let index = match request.direction {
            Direction::Forward => 0,
            Direction::Backward => page.units.len() - 1,
        };
        info!(chapter = page.chapter, page = page.page, index, "loaded page");
        self.install(page, index)
    }

    /// Drop the in-flight load, e.g. when its driver is torn down. A result
    /// that arrives afterwards is discarded.
    pub fn cancel_pending(&mut self) {
        if self.pending.take().is_some() {
            self.restore_active();
        }
    }

    pub fn advance<L: ContentLoader + ?Sized>(
        &mut self,
        loader: &mut L,
        now: Instant,
    ) -> Result<Transition, SessionError> {
        match self.begin_advance(now)? {
            Step::Ready(transition) => Ok(transition),
            Step::Load(request) => {
                let result = request.run(loader, &self.range, &self.cursor);
                self.complete_load(request, result)
            }
        }
    }

    pub fn retreat<L: ContentLoader + ?Sized>(&mut self, loader: &mut L) -> Result<Transition, SessionError> {
        match self.begin_retreat()? {
            Step::Ready(transition) => Ok(transition),
            Step::Load(request) => {
                let result = request.run(loader, &self.range, &self.cursor);
                self.complete_load(request, result)
            }
        }
    }

    fn request(&mut self, target: LoadTarget, direction: Direction) -> LoadRequest {
        self.next_ticket += 1;
        let request = LoadRequest {
            ticket: self.next_ticket,
            target,
            direction,
        };
        self.pending = Some(request);
        request
    }

    /// The active unit always has a comparator, typed into or not.
    fn touch_active(&mut self) {
        if let Some(unit) = self.units.get(self.cursor.active_unit_index) {
            self.visited
                .entry(unit.id)
                .or_insert_with(|| VerseComparator::new(&unit.text));
        }
    }

    fn restore_active(&mut self) {
        self.phase = if self.units.is_empty() {
            SessionPhase::Idle
        } else {
            SessionPhase::Active(self.cursor.active_unit_index)
        };
    }

    fn restart_selection(&mut self) {
        self.pending = None;
        self.visited.clear();
        self.completion_notified = false;
        self.last_advance_at = None;
    }

    fn install(&mut self, page: Page, index: usize) -> Result<Transition, SessionError> {
        if page.units.is_empty() {
            self.units.clear();
            self.phase = SessionPhase::Idle;
            return Err(SessionError::EmptyPage);
        }
        let index = index.min(page.units.len() - 1);

        self.cursor = SessionCursor {
            active_unit_index: index,
            page: page.page,
            chapter: page.chapter,
            has_next_page: page.has_next_page,
            has_prev_page: page.has_prev_page,
        };
        self.units = page.units;
        self.paged = true;
        self.phase = SessionPhase::Active(index);
        self.touch_active();

        Ok(Transition::Loaded {
            chapter: self.cursor.chapter,
            page: self.cursor.page,
            index,
        })
    }
}
