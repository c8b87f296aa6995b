//! RFC 1459 case mapping.
//!
//! Nicknames and channel names compare case-insensitively with the
//! Scandinavian bracket equivalences (`[]\~` fold to `{}|^`). Every registry
//! index in the daemon is keyed through [`irc_to_lower`].

/// Fold one character.
#[inline]
pub const fn irc_lower_char(c: char) -> char {
    match c {
        'A'..='Z' => (c as u8 + 32) as char,
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        _ => c,
    }
}

/// Fold a whole name for use as an index key.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(irc_lower_char).collect()
}

/// Case-insensitive comparison without allocating.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .chars()
            .zip(b.chars())
            .all(|(x, y)| irc_lower_char(x) == irc_lower_char(y))
}

/// True when `name` looks like a channel we can track (`#` prefixed, no
/// spaces, commas or control characters).
pub fn is_channel_name(name: &str) -> bool {
    name.len() > 1
        && name.starts_with('#')
        && !name
            .chars()
            .any(|c| c == ' ' || c == ',' || c == '\x07' || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_brackets_and_ascii() {
        assert_eq!(irc_to_lower("Alice[Away]"), "alice{away}");
        assert_eq!(irc_to_lower("#Ops\\Log~"), "#ops|log^");
        assert_eq!(irc_lower_char('7'), '7');
    }

    #[test]
    fn eq_matches_folded_forms() {
        assert!(irc_eq("Bob[m]", "bob{M}"));
        assert!(!irc_eq("bob", "bobby"));
        assert!(!irc_eq("bob", "rob"));
    }

    #[test]
    fn channel_name_rules() {
        assert!(is_channel_name("#services"));
        assert!(!is_channel_name("#"));
        assert!(!is_channel_name("services"));
        assert!(!is_channel_name("#a,b"));
        assert!(!is_channel_name("#a b"));
    }
}
