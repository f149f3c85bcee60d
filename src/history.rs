//! Linear fit history with a cursor.
//!
//! Behaves like an undo stack: `prev`/`next` move through completed fits
//! without recomputing anything, and adding a fit while looking at an older
//! entry discards every entry after it.

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::domain::FitResult;

/// A completed fit plus the equation snapshot it was produced from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub result: FitResult,
    pub equation_text: String,
    pub parameters: Vec<String>,
    pub recorded_at: DateTime<Local>,
}

#[derive(Debug, Clone, Default)]
pub struct FitHistory {
    entries: Vec<HistoryEntry>,
    /// `None` only while the history is empty.
    cursor: Option<usize>,
}

impl FitHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fit and move the cursor to it, dropping entries after the cursor.
    pub fn add(&mut self, result: FitResult, equation_text: impl Into<String>, parameters: Vec<String>) {
        if let Some(cursor) = self.cursor {
            self.entries.truncate(cursor + 1);
        }
        self.entries.push(HistoryEntry {
            result,
            equation_text: equation_text.into(),
            parameters,
            recorded_at: Local::now(),
        });
        self.cursor = Some(self.entries.len() - 1);
    }

    /// `add` using the equation snapshot already stored in the result.
    pub fn record(&mut self, result: FitResult) {
        let equation_text = result.equation_text.clone();
        let parameters = result.parameters.clone();
        self.add(result, equation_text, parameters);
    }

    /// Step back; no-op at the first entry.
    pub fn prev(&mut self) -> Option<&HistoryEntry> {
        if let Some(cursor) = self.cursor {
            self.cursor = Some(cursor.saturating_sub(1));
        }
        self.current()
    }

    /// Step forward; no-op at the last entry.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&HistoryEntry> {
        if let Some(cursor) = self.cursor {
            if cursor + 1 < self.entries.len() {
                self.cursor = Some(cursor + 1);
            }
        }
        self.current()
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.cursor.and_then(|c| self.entries.get(c))
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn can_go_back(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    pub fn can_go_forward(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 < self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }
}
