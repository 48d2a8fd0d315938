use include_dir::{include_dir, Dir};
use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::content::{ContentLoader, LoadError, Page, PageIndex, RangeSelector, RangeStats, TextUnit, UnitId};

static CORPUS_DIR: Dir = include_dir!("src/corpus");

pub const BUNDLED: &str = "sample.json";

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("bundled corpus {0} not found")]
    MissingBundled(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid corpus json: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Deserialize)]
pub struct Chapter {
    pub number: u32,
    pub verses: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Book {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub abbreviation: String,
    pub chapters: Vec<Chapter>,
}

impl Book {
    pub fn chapter(&self, number: u32) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.number == number)
    }

    fn unit(&self, chapter: &Chapter, index: usize) -> TextUnit {
        let number = index as u32 + 1;
        let short = if self.abbreviation.is_empty() {
            &self.name
        } else {
            &self.abbreviation
        };
        TextUnit {
            id: unit_id(self.id, chapter.number, number),
            chapter: chapter.number,
            number,
            label: format!("{short} {}:{number}", chapter.number),
            text: chapter.verses[index].clone(),
        }
    }
}

/// Stable id from the verse coordinates.
pub fn unit_id(book: u32, chapter: u32, verse: u32) -> UnitId {
    book as UnitId * 1_000_000 + chapter as UnitId * 1_000 + verse as UnitId
}

/// Verse collection read from JSON, paged in fixed-size windows per chapter.
#[derive(Clone, Debug, Deserialize)]
pub struct Corpus {
    pub name: String,
    pub books: Vec<Book>,
    #[serde(skip, default = "default_page_size")]
    page_size: usize,
}

fn default_page_size() -> usize {
    10
}

impl Corpus {
    pub fn bundled() -> Result<Self, CorpusError> {
        let file = CORPUS_DIR
            .get_file(BUNDLED)
            .ok_or_else(|| CorpusError::MissingBundled(BUNDLED.to_string()))?;
        let text = file
            .contents_utf8()
            .ok_or_else(|| CorpusError::MissingBundled(BUNDLED.to_string()))?;
        Self::from_json(text)
    }

    pub fn from_path(path: &Path) -> Result<Self, CorpusError> {
        let text = std::fs::read_to_string(path).map_err(|source| CorpusError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, CorpusError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn book(&self, id: u32) -> Option<&Book> {
        self.books.iter().find(|b| b.id == id)
    }

    /// Lookup by id, full name or abbreviation.
    pub fn find_book(&self, query: &str) -> Option<&Book> {
        if let Ok(id) = query.parse::<u32>() {
            return self.book(id);
        }
        self.books
            .iter()
            .find(|b| b.name == query || b.abbreviation == query)
    }

    /// `n` distinct verses drawn from the whole corpus, in reading order.
    pub fn random_units<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<TextUnit> {
        let all = self
            .books
            .iter()
            .flat_map(|book| {
                book.chapters
                    .iter()
                    .flat_map(move |chapter| (0..chapter.verses.len()).map(move |i| book.unit(chapter, i)))
            })
            .collect_vec();

        all.choose_multiple(rng, n)
            .cloned()
            .sorted_by_key(|u| u.id)
            .collect()
    }

    fn page_count(&self, chapter: &Chapter) -> u32 {
        chapter.verses.len().div_ceil(self.page_size).max(1) as u32
    }

    fn lookup(&self, range: &RangeSelector, chapter: u32) -> Result<(&Book, &Chapter), LoadError> {
        let book = self.book(range.book_id).ok_or(LoadError::UnknownBook(range.book_id))?;
        let found = book.chapter(chapter).ok_or(LoadError::UnknownChapter {
            book_id: range.book_id,
            chapter,
        })?;
        Ok((book, found))
    }
}

impl ContentLoader for Corpus {
    fn load_units(&mut self, range: &RangeSelector) -> Result<Page, LoadError> {
        let page = range
            .start_verse
            .map_or(1, |verse| (verse.saturating_sub(1) as usize / self.page_size) as u32 + 1);
        self.load_page(range, range.chapter_start, PageIndex::Number(page))
    }

    fn load_page(&mut self, range: &RangeSelector, chapter: u32, page: PageIndex) -> Result<Page, LoadError> {
        let (book, found) = self.lookup(range, chapter)?;
        let pages = self.page_count(found);
        let number = match page {
            PageIndex::Number(n) => n,
            PageIndex::Last => pages,
        };
        if number == 0 || number > pages {
            return Err(LoadError::UnknownPage { chapter, page: number });
        }

        let start = (number as usize - 1) * self.page_size;
        let end = (start + self.page_size).min(found.verses.len());
        let units = (start..end).map(|i| book.unit(found, i)).collect_vec();
        debug!(chapter, page = number, units = units.len(), "served page");

        Ok(Page {
            units,
            chapter,
            page: number,
            has_next_page: number < pages,
            has_prev_page: number > 1,
        })
    }

    fn range_stats(&mut self, range: &RangeSelector) -> Result<RangeStats, LoadError> {
        let book = self.book(range.book_id).ok_or(LoadError::UnknownBook(range.book_id))?;
        // Typing starts at `start_verse`, so earlier verses of the first
        // chapter are not part of the target.
        let skip = range.start_verse.map_or(0, |verse| verse.saturating_sub(1) as usize);
        let verses = book
            .chapters
            .iter()
            .filter(|c| range.contains_chapter(c.number))
            .flat_map(|c| {
                let first = if c.number == range.chapter_start { skip } else { 0 };
                c.verses.iter().skip(first)
            })
            .collect_vec();

        Ok(RangeStats {
            unit_count: verses.len(),
            character_count: verses.iter().map(|v| v.chars().count()).sum(),
        })
    }
}
