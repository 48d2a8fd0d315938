//! Per-position classification of live input against a target verse.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::hangul::{decompose_str, final_components, vowel_components, PhonemicUnit, UnitKind};
use crate::typing_policy::{Boundary, BoundaryPolicy};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    Pending,
    Current,
    Correct,
    Incorrect,
}

impl Status {
    pub fn is_resolved(self) -> bool {
        matches!(self, Status::Correct | Status::Incorrect)
    }

    pub fn is_typed(self) -> bool {
        self != Status::Pending
    }
}

/// One status per target position.
///
/// Positions past the end of `typed` are `Pending`; extra typed positions past
/// the end of `target` are ignored. Only the last typed position may remain
/// `Current`.
pub fn compare(target: &[PhonemicUnit], typed: &[PhonemicUnit], policy: &dyn BoundaryPolicy) -> Vec<Status> {
    let last = typed.len().checked_sub(1);

    let mut statuses: Vec<Status> = target
        .iter()
        .enumerate()
        .map(|(i, t)| classify(i, t, target, typed, last, policy))
        .collect();

    stabilize(&mut statuses, target, typed, last);
    statuses
}

pub fn is_complete(target_len: usize, typed_len: usize, statuses: &[Status]) -> bool {
    typed_len >= target_len && statuses.last().is_some_and(|s| s.is_resolved())
}

fn renders_as_target(typed: &PhonemicUnit, target: &PhonemicUnit) -> bool {
    let display = typed.display();
    let mut chars = display.chars();
    chars.next() == Some(target.source) && chars.next().is_none()
}

fn classify(
    i: usize,
    t: &PhonemicUnit,
    target: &[PhonemicUnit],
    typed: &[PhonemicUnit],
    last: Option<usize>,
    policy: &dyn BoundaryPolicy,
) -> Status {
    let Some(u) = typed.get(i) else {
        return Status::Pending;
    };
    let is_last = last == Some(i);
    let boundary = Boundary {
        target: t,
        typed: u,
        next_target: target.get(i + 1),
        next_typed: typed.get(i + 1),
    };

    if u.initial != t.initial {
        return if is_last && policy.next_block_started(&boundary) {
            Status::Current
        } else {
            Status::Incorrect
        };
    }

    if u.vowel.is_none() && t.vowel.is_some() {
        return if is_last { Status::Current } else { Status::Incorrect };
    }

    if let Some(vowel) = u.vowel {
        if u.vowel != t.vowel {
            let toward_compound = t.is_compound_vowel
                && t.vowel
                    .and_then(vowel_components)
                    .is_some_and(|parts| parts.contains(&vowel));
            return if toward_compound { Status::Current } else { Status::Incorrect };
        }
    }

    if let Some(final_consonant) = u.final_consonant {
        if u.final_consonant != t.final_consonant {
            if is_last && policy.final_is_next_initial(&boundary) {
                return Status::Current;
            }
            let toward_compound = t.is_compound_final
                && t.final_consonant
                    .and_then(final_components)
                    .is_some_and(|parts| parts.contains(&final_consonant));
            return if toward_compound && is_last {
                Status::Current
            } else {
                Status::Incorrect
            };
        }
    }

    if is_last {
        // a block that already renders as the target is settled even while it
        // is the tail of the input; a passthrough character cannot be recomposed
        return if renders_as_target(u, t) {
            Status::Correct
        } else if u.kind == UnitKind::Syllabic {
            Status::Current
        } else {
            Status::Incorrect
        };
    }

    if renders_as_target(u, t) {
        Status::Correct
    } else {
        Status::Incorrect
    }
}

fn stabilize(statuses: &mut [Status], target: &[PhonemicUnit], typed: &[PhonemicUnit], last: Option<usize>) {
    for (i, status) in statuses.iter_mut().enumerate() {
        if *status != Status::Current || last == Some(i) {
            continue;
        }
        *status = match (typed.get(i), target.get(i)) {
            (Some(u), Some(t)) if renders_as_target(u, t) => Status::Correct,
            _ => Status::Incorrect,
        };
    }
}

/// Rendering cell: the glyph to show and how to style it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub text: String,
    pub status: Status,
}

/// Outcome of feeding a new input snapshot to a [`VerseComparator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompareOutcome {
    pub complete: bool,
    /// True only on the update that first made the unit complete.
    pub just_completed: bool,
}

/// Cached comparison state for one verse: the decomposed target, the latest
/// input snapshot and its status stream.
#[derive(Clone, Debug)]
pub struct VerseComparator {
    target: Vec<PhonemicUnit>,
    input: String,
    typed: Vec<PhonemicUnit>,
    statuses: Vec<Status>,
    completion_reported: bool,
}

impl VerseComparator {
    pub fn new(text: &str) -> Self {
        let target = decompose_str(text);
        let statuses = vec![Status::Pending; target.len()];
        Self {
            target,
            input: String::new(),
            typed: Vec::new(),
            statuses,
            completion_reported: false,
        }
    }

    pub fn update(&mut self, input: &str, policy: &dyn BoundaryPolicy) -> CompareOutcome {
        self.input = input.to_owned();
        self.typed = decompose_str(input);
        self.statuses = compare(&self.target, &self.typed, policy);

        let complete = self.is_complete();
        let just_completed = complete && !self.completion_reported;
        // re-arm once the input drops back below completion
        self.completion_reported = complete;

        trace!(
            typed = self.typed.len(),
            target = self.target.len(),
            complete,
            "compared input"
        );

        CompareOutcome {
            complete,
            just_completed,
        }
    }

    pub fn reset(&mut self) {
        self.input.clear();
        self.typed.clear();
        self.statuses = vec![Status::Pending; self.target.len()];
        self.completion_reported = false;
    }

    pub fn is_complete(&self) -> bool {
        is_complete(self.target.len(), self.typed.len(), &self.statuses)
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn statuses(&self) -> &[Status] {
        &self.statuses
    }

    pub fn target(&self) -> &[PhonemicUnit] {
        &self.target
    }

    pub fn typed(&self) -> &[PhonemicUnit] {
        &self.typed
    }

    /// Number of jamo and passthrough parts typed so far.
    pub fn typed_part_count(&self) -> usize {
        self.typed.iter().map(|u| u.parts.len()).sum()
    }

    /// The target part expected at a flattened part position.
    pub fn expected_part(&self, position: usize) -> Option<char> {
        self.target.iter().flat_map(|u| u.parts.iter().copied()).nth(position)
    }

    pub fn expected_char(&self, index: usize) -> Option<char> {
        self.target.get(index).map(|u| u.source)
    }

    pub fn cells(&self) -> Vec<Cell> {
        self.target
            .iter()
            .zip(&self.statuses)
            .map(|(t, &status)| {
                let text = match (status, self.typed.get(t.index)) {
                    (Status::Current | Status::Incorrect, Some(u)) => u.display(),
                    _ => t.source.to_string(),
                };
                Cell { text, status }
            })
            .collect()
    }
}
