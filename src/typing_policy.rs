//! Syllable-boundary heuristics for IME artifacts.
//!
//! While a block is being composed the IME briefly shows a freshly pressed
//! consonant as the *previous* block's final before moving it to the next
//! block's initial (`가` + `ㄴ` shows `간` until the next vowel arrives). The
//! comparator asks a [`BoundaryPolicy`] whether such a state should be
//! forgiven as in-progress instead of flagged as a typo.

use crate::hangul::{final_components, PhonemicUnit};

/// A typed slot together with its target and the slot after it.
#[derive(Clone, Copy, Debug)]
pub struct Boundary<'a> {
    pub target: &'a PhonemicUnit,
    pub typed: &'a PhonemicUnit,
    pub next_target: Option<&'a PhonemicUnit>,
    pub next_typed: Option<&'a PhonemicUnit>,
}

pub trait BoundaryPolicy: Send + Sync {
    /// The initial of this slot is wrong, but the user has already begun the
    /// next block with the right initial and no vowel yet.
    fn next_block_started(&self, boundary: &Boundary<'_>) -> bool;

    /// The final typed on this slot is the next target block's initial (or a
    /// compound final containing it) that the IME has not re-attached yet.
    fn final_is_next_initial(&self, boundary: &Boundary<'_>) -> bool;
}

/// Forgives the transient states a standard Korean IME produces.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImeBoundaries;

impl BoundaryPolicy for ImeBoundaries {
    fn next_block_started(&self, boundary: &Boundary<'_>) -> bool {
        match (boundary.next_target, boundary.next_typed) {
            (Some(next_target), Some(next_typed)) => {
                next_typed.initial.is_some()
                    && next_typed.initial == next_target.initial
                    && next_typed.vowel.is_none()
            }
            _ => false,
        }
    }

    fn final_is_next_initial(&self, boundary: &Boundary<'_>) -> bool {
        let Some(typed_final) = boundary.typed.final_consonant else {
            return false;
        };
        let Some(next_initial) = boundary.next_target.and_then(|next| next.initial) else {
            return false;
        };

        let carries_next_initial = typed_final == next_initial
            || final_components(typed_final).is_some_and(|parts| parts.contains(&next_initial));

        carries_next_initial && boundary.next_typed.map_or(true, |next| next.vowel.is_none())
    }
}

/// Every mismatch counts immediately.
#[derive(Clone, Copy, Debug, Default)]
pub struct StrictBoundaries;

impl BoundaryPolicy for StrictBoundaries {
    fn next_block_started(&self, _boundary: &Boundary<'_>) -> bool {
        false
    }

    fn final_is_next_initial(&self, _boundary: &Boundary<'_>) -> bool {
        false
    }
}

pub fn policy_for(strict: bool) -> Box<dyn BoundaryPolicy> {
    if strict {
        Box::new(StrictBoundaries)
    } else {
        Box::new(ImeBoundaries)
    }
}
