//! Per-task print options as submitted by the client.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::task::{PageMode, PaperSize};

/// A page bound as submitted: clients send either numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bound {
    Int(i64),
    Text(String),
}

impl Bound {
    /// The bound as a 1-based page number, if it is a positive integer.
    pub fn as_page(&self) -> Option<u32> {
        match self {
            Bound::Int(n) => u32::try_from(*n).ok().filter(|n| *n > 0),
            Bound::Text(s) => {
                if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                s.parse::<u32>().ok().filter(|n| *n > 0)
            }
        }
    }
}

impl From<u32> for Bound {
    fn from(n: u32) -> Self {
        Bound::Int(i64::from(n))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintOptions {
    pub color: bool,
    pub duplex: bool,
    pub copies: u32,
    pub paper_size: PaperSize,
    pub page_mode: PageMode,
    pub range_start: Option<Bound>,
    pub range_end: Option<Bound>,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            color: false,
            duplex: false,
            copies: 1,
            paper_size: PaperSize::A4,
            page_mode: PageMode::All,
            range_start: None,
            range_end: None,
        }
    }
}

impl PrintOptions {
    pub fn color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn duplex(mut self, duplex: bool) -> Self {
        self.duplex = duplex;
        self
    }

    pub fn copies(mut self, copies: u32) -> Self {
        self.copies = copies;
        self
    }

    pub fn range(mut self, start: impl Into<Bound>, end: impl Into<Bound>) -> Self {
        self.page_mode = PageMode::Range;
        self.range_start = Some(start.into());
        self.range_end = Some(end.into());
        self
    }

    /// Resolves the requested pages. Anything but a well-formed ascending
    /// range falls back to the whole document.
    pub fn page_selection(&self) -> PageSelection {
        if self.page_mode != PageMode::Range {
            return PageSelection::All;
        }
        let start = self.range_start.as_ref().and_then(Bound::as_page);
        let end = self.range_end.as_ref().and_then(Bound::as_page);
        match (start, end) {
            (Some(start), Some(end)) if end >= start => PageSelection::Range { start, end },
            _ => PageSelection::All,
        }
    }
}

/// Options keyed by task id.
pub type JobOptions = HashMap<String, PrintOptions>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum PageSelection {
    All,
    Range { start: u32, end: u32 },
}

impl PageSelection {
    /// Pages to print out of a document of `total` pages.
    pub fn page_count(&self, total: u32) -> u32 {
        match self {
            PageSelection::All => total,
            PageSelection::Range { start, end } => end - start + 1,
        }
    }

    pub fn mode(&self) -> PageMode {
        match self {
            PageSelection::All => PageMode::All,
            PageSelection::Range { .. } => PageMode::Range,
        }
    }

    pub fn bounds(&self) -> Option<(u32, u32)> {
        match self {
            PageSelection::All => None,
            PageSelection::Range { start, end } => Some((*start, *end)),
        }
    }
}
