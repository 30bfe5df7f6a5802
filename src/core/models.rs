use serde::{Deserialize, Serialize};

use crate::resilience::AppError;

/// One frame of a progressively revealed summary.
///
/// Entries after `current_bullet_index` are empty strings, entries before it
/// hold their final text, and the entry at it holds the typed prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingState {
    pub is_complete: bool,
    pub bullet_points: Vec<String>,
    /// `-1` until the first bullet starts.
    pub current_bullet_index: isize,
    pub current_bullet_text: String,
}

impl StreamingState {
    /// Terminal frame for a summary with no bullets.
    #[must_use]
    pub const fn empty_complete() -> Self {
        Self {
            is_complete: true,
            bullet_points: Vec::new(),
            current_bullet_index: -1,
            current_bullet_text: String::new(),
        }
    }

    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        usize::try_from(self.current_bullet_index).ok()
    }
}

/// What a [`SummaryHandle`](crate::worker::summarize::SummaryHandle) yields.
#[derive(Debug, Clone)]
pub enum SummaryEvent {
    Snapshot(StreamingState),
    /// The summary could not be produced. Show `error.user_message()`.
    Failed(AppError),
    Cancelled,
}

impl SummaryEvent {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        match self {
            SummaryEvent::Snapshot(state) => state.is_complete,
            SummaryEvent::Failed(_) | SummaryEvent::Cancelled => true,
        }
    }
}
