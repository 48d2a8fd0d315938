//! Text units and the loader seam the session pulls them through.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionCursor;

pub type UnitId = u64;

/// A verse: the smallest span typed in one pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    pub id: UnitId,
    pub chapter: u32,
    pub number: u32,
    /// Short reference label, e.g. `창 1:1`.
    #[serde(default)]
    pub label: String,
    pub text: String,
}

impl TextUnit {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Which verses the user selected to type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSelector {
    pub book_id: u32,
    pub chapter_start: u32,
    pub chapter_end: u32,
    pub start_verse: Option<u32>,
}

impl RangeSelector {
    pub fn new(book_id: u32, chapter_start: u32, chapter_end: u32) -> Self {
        Self {
            book_id,
            chapter_start,
            chapter_end: chapter_end.max(chapter_start),
            start_verse: None,
        }
    }

    pub fn starting_at(mut self, verse: u32) -> Self {
        self.start_verse = Some(verse);
        self
    }

    pub fn contains_chapter(&self, chapter: u32) -> bool {
        (self.chapter_start..=self.chapter_end).contains(&chapter)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeStats {
    pub unit_count: usize,
    pub character_count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageIndex {
    Number(u32),
    Last,
}

/// One page of units plus the pagination facts the session needs to decide
/// whether to fall through to chapter navigation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Page {
    pub units: Vec<TextUnit>,
    pub chapter: u32,
    pub page: u32,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("book {0} not found")]
    UnknownBook(u32),

    #[error("chapter {chapter} of book {book_id} not found")]
    UnknownChapter { book_id: u32, chapter: u32 },

    #[error("page {page} of chapter {chapter} not found")]
    UnknownPage { chapter: u32, page: u32 },

    #[error("content source unavailable: {0}")]
    Unavailable(String),
}

/// Source of text units. Pages are 1-based and never span chapters.
pub trait ContentLoader {
    /// First page of the selection; the page holding `start_verse` when set.
    fn load_units(&mut self, range: &RangeSelector) -> Result<Page, LoadError>;

    fn load_page(&mut self, range: &RangeSelector, chapter: u32, page: PageIndex) -> Result<Page, LoadError>;

    /// Totals over the whole selection, not just loaded pages.
    fn range_stats(&mut self, range: &RangeSelector) -> Result<RangeStats, LoadError>;

    fn load_next_page(&mut self, range: &RangeSelector, cursor: &SessionCursor) -> Result<Page, LoadError> {
        self.load_page(range, cursor.chapter, PageIndex::Number(cursor.page + 1))
    }

    fn load_prev_page(&mut self, range: &RangeSelector, cursor: &SessionCursor) -> Result<Page, LoadError> {
        self.load_page(range, cursor.chapter, PageIndex::Number(cursor.page.saturating_sub(1).max(1)))
    }
}
