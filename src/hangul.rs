//! Hangul syllable codec.
//!
//! A precomposed syllable block in `U+AC00..=U+D7A3` encodes its initial
//! consonant, vowel and optional final consonant arithmetically:
//! `BASE + (initial * 21 + vowel) * 28 + final`. Everything here works on
//! Hangul Compatibility Jamo (`ㄱ`, `ㅏ`, ...) since that is what a system IME
//! emits for a not-yet-composed block.

use serde::{Deserialize, Serialize};

pub const SYLLABLE_BASE: u32 = 0xAC00;
pub const SYLLABLE_LAST: u32 = 0xD7A3;

const VOWEL_COUNT: u32 = 21;
const FINAL_COUNT: u32 = 28;
const BLOCK_STRIDE: u32 = VOWEL_COUNT * FINAL_COUNT;

pub const INITIALS: [char; 19] = [
    'ㄱ', 'ㄲ', 'ㄴ', 'ㄷ', 'ㄸ', 'ㄹ', 'ㅁ', 'ㅂ', 'ㅃ', 'ㅅ', 'ㅆ', 'ㅇ', 'ㅈ', 'ㅉ', 'ㅊ', 'ㅋ', 'ㅌ',
    'ㅍ', 'ㅎ',
];

pub const VOWELS: [char; 21] = [
    'ㅏ', 'ㅐ', 'ㅑ', 'ㅒ', 'ㅓ', 'ㅔ', 'ㅕ', 'ㅖ', 'ㅗ', 'ㅘ', 'ㅙ', 'ㅚ', 'ㅛ', 'ㅜ', 'ㅝ', 'ㅞ', 'ㅟ',
    'ㅠ', 'ㅡ', 'ㅢ', 'ㅣ',
];

/// Index 0 is the absent final.
pub const FINALS: [Option<char>; 28] = [
    None,
    Some('ㄱ'),
    Some('ㄲ'),
    Some('ㄳ'),
    Some('ㄴ'),
    Some('ㄵ'),
    Some('ㄶ'),
    Some('ㄷ'),
    Some('ㄹ'),
    Some('ㄺ'),
    Some('ㄻ'),
    Some('ㄼ'),
    Some('ㄽ'),
    Some('ㄾ'),
    Some('ㄿ'),
    Some('ㅀ'),
    Some('ㅁ'),
    Some('ㅂ'),
    Some('ㅄ'),
    Some('ㅅ'),
    Some('ㅆ'),
    Some('ㅇ'),
    Some('ㅈ'),
    Some('ㅊ'),
    Some('ㅋ'),
    Some('ㅌ'),
    Some('ㅍ'),
    Some('ㅎ'),
];

const COMPOUND_VOWELS: [(char, [char; 2]); 7] = [
    ('ㅘ', ['ㅗ', 'ㅏ']),
    ('ㅙ', ['ㅗ', 'ㅐ']),
    ('ㅚ', ['ㅗ', 'ㅣ']),
    ('ㅝ', ['ㅜ', 'ㅓ']),
    ('ㅞ', ['ㅜ', 'ㅔ']),
    ('ㅟ', ['ㅜ', 'ㅣ']),
    ('ㅢ', ['ㅡ', 'ㅣ']),
];

const COMPOUND_FINALS: [(char, [char; 2]); 11] = [
    ('ㄳ', ['ㄱ', 'ㅅ']),
    ('ㄵ', ['ㄴ', 'ㅈ']),
    ('ㄶ', ['ㄴ', 'ㅎ']),
    ('ㄺ', ['ㄹ', 'ㄱ']),
    ('ㄻ', ['ㄹ', 'ㅁ']),
    ('ㄼ', ['ㄹ', 'ㅂ']),
    ('ㄽ', ['ㄹ', 'ㅅ']),
    ('ㄾ', ['ㄹ', 'ㅌ']),
    ('ㄿ', ['ㄹ', 'ㅍ']),
    ('ㅀ', ['ㄹ', 'ㅎ']),
    ('ㅄ', ['ㅂ', 'ㅅ']),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UnitKind {
    Syllabic,
    Latin,
    Space,
    Symbol,
}

/// One character position of a decomposed string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhonemicUnit {
    pub index: usize,
    pub source: char,
    pub initial: Option<char>,
    pub vowel: Option<char>,
    pub final_consonant: Option<char>,
    pub parts: Vec<char>,
    pub kind: UnitKind,
    pub is_compound_vowel: bool,
    pub is_compound_final: bool,
}

impl PhonemicUnit {
    fn passthrough(index: usize, source: char, kind: UnitKind) -> Self {
        Self {
            index,
            source,
            initial: None,
            vowel: None,
            final_consonant: None,
            parts: vec![source],
            kind,
            is_compound_vowel: false,
            is_compound_final: false,
        }
    }

    /// The glyph this unit renders as once its parts are recomposed.
    pub fn display(&self) -> String {
        if self.initial.is_some() && self.vowel.is_some() {
            compose(self.initial, self.vowel, self.final_consonant)
        } else {
            self.source.to_string()
        }
    }

    pub fn is_syllable_block(&self) -> bool {
        self.initial.is_some() && self.vowel.is_some()
    }
}

pub fn is_syllable_block(c: char) -> bool {
    (SYLLABLE_BASE..=SYLLABLE_LAST).contains(&(c as u32))
}

pub fn decompose_char(c: char, index: usize) -> PhonemicUnit {
    if is_syllable_block(c) {
        let offset = c as u32 - SYLLABLE_BASE;
        let initial = INITIALS[(offset / BLOCK_STRIDE) as usize];
        let vowel = VOWELS[((offset % BLOCK_STRIDE) / FINAL_COUNT) as usize];
        let final_consonant = FINALS[(offset % FINAL_COUNT) as usize];

        let mut parts = vec![initial, vowel];
        parts.extend(final_consonant);

        return PhonemicUnit {
            index,
            source: c,
            initial: Some(initial),
            vowel: Some(vowel),
            final_consonant,
            parts,
            kind: UnitKind::Syllabic,
            is_compound_vowel: is_compound_vowel(vowel),
            is_compound_final: final_consonant.is_some_and(is_compound_final),
        };
    }

    // Only modern compatibility jamo are syllabic parts. Conjoining and
    // archaic jamo fall through to the symbol passthrough.
    let mut unit = PhonemicUnit::passthrough(index, c, UnitKind::Syllabic);
    if INITIALS.contains(&c) {
        unit.initial = Some(c);
        return unit;
    }
    if VOWELS.contains(&c) {
        unit.vowel = Some(c);
        unit.is_compound_vowel = is_compound_vowel(c);
        return unit;
    }
    if FINALS.contains(&Some(c)) {
        unit.final_consonant = Some(c);
        unit.is_compound_final = is_compound_final(c);
        return unit;
    }

    let kind = if c == ' ' {
        UnitKind::Space
    } else if c.is_ascii_alphanumeric() {
        UnitKind::Latin
    } else {
        UnitKind::Symbol
    };
    PhonemicUnit::passthrough(index, c, kind)
}

pub fn decompose_str(text: &str) -> Vec<PhonemicUnit> {
    text.chars()
        .enumerate()
        .map(|(index, c)| decompose_char(c, index))
        .collect()
}

/// Rebuild a display glyph from its parts. Never fails: without both an
/// initial and a vowel the lone part is returned as is, and parts outside the
/// alphabets are concatenated.
pub fn compose(initial: Option<char>, vowel: Option<char>, final_consonant: Option<char>) -> String {
    let (Some(i), Some(v)) = (initial, vowel) else {
        return initial.or(vowel).map(String::from).unwrap_or_default();
    };

    let initial_index = INITIALS.iter().position(|&c| c == i);
    let vowel_index = VOWELS.iter().position(|&c| c == v);
    let final_index = match final_consonant {
        None => Some(0),
        Some(f) => FINALS.iter().position(|&c| c == Some(f)),
    };

    let code = match (initial_index, vowel_index, final_index) {
        (Some(ii), Some(vi), Some(fi)) => {
            char::from_u32(SYLLABLE_BASE + (ii as u32 * VOWEL_COUNT + vi as u32) * FINAL_COUNT + fi as u32)
        }
        _ => None,
    };

    match code {
        Some(c) => c.to_string(),
        None => [Some(i), Some(v), final_consonant].into_iter().flatten().collect(),
    }
}

pub fn is_compound_vowel(vowel: char) -> bool {
    vowel_components(vowel).is_some()
}

pub fn is_compound_final(final_consonant: char) -> bool {
    final_components(final_consonant).is_some()
}

/// `ㅘ` -> `[ㅗ, ㅏ]`
pub fn vowel_components(vowel: char) -> Option<[char; 2]> {
    COMPOUND_VOWELS
        .iter()
        .find(|(compound, _)| *compound == vowel)
        .map(|(_, parts)| *parts)
}

/// `ㅄ` -> `[ㅂ, ㅅ]`
pub fn final_components(final_consonant: char) -> Option<[char; 2]> {
    COMPOUND_FINALS
        .iter()
        .find(|(compound, _)| *compound == final_consonant)
        .map(|(_, parts)| *parts)
}

pub fn combine_vowels(first: char, second: char) -> Option<char> {
    COMPOUND_VOWELS
        .iter()
        .find(|(_, parts)| *parts == [first, second])
        .map(|(compound, _)| *compound)
}

pub fn combine_finals(first: char, second: char) -> Option<char> {
    COMPOUND_FINALS
        .iter()
        .find(|(_, parts)| *parts == [first, second])
        .map(|(compound, _)| *compound)
}
