//! Bounded conversation window used to ground the generative fallback.

use supportline_core::session::{Speaker, Turn};

/// The last few turns of a session, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ContextWindow {
    turns: Vec<Turn>,
}

impl ContextWindow {
    /// Build a window over the last `capacity` turns of a transcript.
    pub fn from_turns(turns: &[Turn], capacity: usize) -> Self {
        let start = turns.len().saturating_sub(capacity);
        Self {
            turns: turns[start..].to_vec(),
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Render as `Customer: ...` / `<assistant>: ...` lines.
    pub fn render(&self, assistant_name: &str) -> String {
        render_transcript(&self.turns, assistant_name)
    }
}

/// Render turns as speaker-prefixed lines.
pub fn render_transcript(turns: &[Turn], assistant_name: &str) -> String {
    turns
        .iter()
        .map(|t| match t.speaker {
            Speaker::User => format!("Customer: {}", t.text),
            Speaker::Assistant => format!("{assistant_name}: {}", t.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
