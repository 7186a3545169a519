// ABOUTME: Deterministic username → icon mapping for chat room participants.
// ABOUTME: SHA-256 of the name, reduced modulo a fixed glyph catalog.

use sha2::{Digest, Sha256};

/// Ordered glyph catalog. Reordering it reassigns every user's icon.
pub const ICON_CATALOG: [&str; 16] = [
    "🐶", "🐱", "🐭", "🐹", "🐰", "🦊", "🐻", "🐼", "🐨", "🐯", "🦁", "🐮", "🐷", "🐸", "🐵", "🐔",
];

/// Return the icon for a username.
///
/// Pure and stable across processes. Callers reject empty names first.
pub fn icon_for(username: &str) -> &'static str {
    let digest = Sha256::digest(username.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let index = u64::from_be_bytes(prefix) % ICON_CATALOG.len() as u64;
    ICON_CATALOG[index as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icon_is_deterministic() {
        for name in ["alice", "bob", "Zoë", "a very long username with spaces"] {
            let first = icon_for(name);
            for _ in 0..10 {
                assert_eq!(icon_for(name), first);
            }
        }
    }

    #[test]
    fn icon_comes_from_catalog() {
        for i in 0..200 {
            let name = format!("user-{}", i);
            assert!(ICON_CATALOG.contains(&icon_for(&name)));
        }
    }

    #[test]
    fn icons_spread_over_catalog() {
        let distinct: std::collections::HashSet<&str> =
            (0..200).map(|i| icon_for(&format!("user-{}", i))).collect();
        assert!(distinct.len() > 1, "every name mapped to the same icon");
    }
}
