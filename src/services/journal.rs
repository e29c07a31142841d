//! Invocation message journal.
//!
//! Every line reported to the scheduler is also emitted as a tracing event,
//! so the log stream and the invocation result never disagree.

use crate::models::{Message, Severity};

/// Collects the info, warning and error lines of one invocation.
#[derive(Debug, Default)]
pub struct Journal {
    messages: Vec<Message>,
}

impl Journal {
    /// Creates an empty journal.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Records an info line.
    pub fn info(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::info!("{text}");
        self.push(Severity::Info, text);
    }

    /// Records a warning.
    pub fn warn(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::warn!("{text}");
        self.push(Severity::Warning, text);
    }

    /// Records an error.
    pub fn error(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::error!("{text}");
        self.push(Severity::Error, text);
    }

    fn push(&mut self, severity: Severity, text: String) {
        self.messages.push(Message { severity, text });
    }

    /// Number of recorded lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the recorded lines.
    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_keeps_order() {
        let mut journal = Journal::new();
        journal.info("started");
        journal.warn("record 1 skipped");
        journal.error("record 2 failed");
        assert_eq!(journal.len(), 3);

        let messages = journal.into_messages();
        assert_eq!(messages[0].severity, Severity::Info);
        assert_eq!(messages[1].severity, Severity::Warning);
        assert_eq!(messages[2].text, "record 2 failed");
    }
}
