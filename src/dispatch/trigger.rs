// ABOUTME: Trigger-word predicate — decides whether a posted message should summon the assistant.
// ABOUTME: One rule: case-insensitive prefix match on a whole token.

/// The reserved keyword that asks the assistant to respond.
///
/// A message triggers when, after trimming, it starts with the token
/// (case-insensitively) and the token is followed by the end of the message or
/// a character that is not alphanumeric. `"nurt"` and `"Nurt, help"` trigger;
/// `"nurture"`, `"turnip"` and `"please nurt"` do not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerWord {
    token: String,
}

impl TriggerWord {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.trim().to_lowercase(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn matches(&self, message: &str) -> bool {
        if self.token.is_empty() {
            return false;
        }
        let normalized = message.trim_start().to_lowercase();
        let Some(rest) = normalized.strip_prefix(self.token.as_str()) else {
            return false;
        };
        rest.chars().next().is_none_or(|c| !c.is_alphanumeric())
    }
}

impl Default for TriggerWord {
    fn default() -> Self {
        Self::new("nurt")
    }
}
