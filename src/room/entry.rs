// ABOUTME: Chat entry types — a single message in the room and the ordered history log.
// ABOUTME: The log serializes as a bare JSON array of {role, icon, content, sender_name}.

use serde::{Deserialize, Serialize};

/// Who authored an entry, in the completion API's role vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message in the room. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: Role,
    pub icon: String,
    pub content: String,
    pub sender_name: String,
}

impl ChatEntry {
    /// Build a user entry.
    pub fn user(sender_name: &str, icon: &str, content: &str) -> Self {
        Self {
            role: Role::User,
            icon: icon.to_string(),
            content: content.to_string(),
            sender_name: sender_name.to_string(),
        }
    }

    /// Build an assistant entry.
    pub fn assistant(sender_name: &str, icon: &str, content: &str) -> Self {
        Self {
            role: Role::Assistant,
            icon: icon.to_string(),
            content: content.to_string(),
            sender_name: sender_name.to_string(),
        }
    }
}

/// Ordered, append-only sequence of entries.
///
/// Because entries are only ever appended, the length doubles as a version
/// token for optimistic compare-and-append.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryLog {
    entries: Vec<ChatEntry>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<ChatEntry>) -> Self {
        Self { entries }
    }

    /// Version token of this snapshot.
    pub fn version(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&ChatEntry> {
        self.entries.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatEntry> {
        self.entries.iter()
    }

    pub(crate) fn push(&mut self, entry: ChatEntry) {
        self.entries.push(entry);
    }
}

impl<'a> IntoIterator for &'a HistoryLog {
    type Item = &'a ChatEntry;
    type IntoIter = std::slice::Iter<'a, ChatEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
