//! Tokenizing of a single wire line.
//!
//! A line is `[@tags] [:source] COMMAND [params...] [:trailing]`. Servers
//! prepend tags freely (UnrealIRCd attaches `s2s-md/*` metadata to almost
//! every user-originated line), so nothing downstream may index raw tokens
//! without stripping them first. [`Line`] does that once.

use std::fmt;

use crate::error::{ProtocolError, Result};

/// One parsed wire line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    /// Message tags in arrival order, values unescaped.
    pub tags: Vec<(String, Option<String>)>,
    /// Source without the leading `:` (a SID, UID, server or nick mask).
    pub source: Option<String>,
    /// Command token, uppercased.
    pub command: String,
    /// Middle params followed by the trailing param, if any.
    pub params: Vec<String>,
}

impl Line {
    /// Parse a line, tolerating a trailing CR/LF.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut rest = raw.trim_end_matches(['\r', '\n']).trim_start();

        let mut tags = Vec::new();
        if let Some(stripped) = rest.strip_prefix('@') {
            let (block, after) = stripped
                .split_once(' ')
                .ok_or(ProtocolError::UnterminatedTags)?;
            tags = parse_tags(block);
            rest = after.trim_start();
        }

        let mut source = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (src, after) = stripped.split_once(' ').unwrap_or((stripped, ""));
            source = Some(src.to_owned());
            rest = after.trim_start();
        }

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return Err(ProtocolError::MissingCommand);
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_owned());
                break;
            }
            match rest.split_once(' ') {
                Some((param, after)) => {
                    params.push(param.to_owned());
                    rest = after;
                }
                None => {
                    params.push(rest.to_owned());
                    break;
                }
            }
        }

        Ok(Self {
            tags,
            source,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Param at `idx`.
    pub fn param(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(String::as_str)
    }

    /// Last param, which is where free text lives.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Value of tag `key`. Valueless tags yield `Some("")`.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_deref().unwrap_or(""))
    }

    /// Source with any `!user@host` suffix removed.
    pub fn source_name(&self) -> Option<&str> {
        self.source
            .as_deref()
            .map(|s| s.split_once('!').map_or(s, |(nick, _)| nick))
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.tags.is_empty() {
            f.write_str("@")?;
            for (i, (k, v)) in self.tags.iter().enumerate() {
                if i > 0 {
                    f.write_str(";")?;
                }
                f.write_str(k)?;
                if let Some(v) = v {
                    write!(f, "={}", escape_tag_value(v))?;
                }
            }
            f.write_str(" ")?;
        }
        if let Some(src) = &self.source {
            write!(f, ":{src} ")?;
        }
        f.write_str(&self.command)?;
        let last = self.params.len().saturating_sub(1);
        for (i, p) in self.params.iter().enumerate() {
            if i == last && (p.is_empty() || p.contains(' ') || p.starts_with(':')) {
                write!(f, " :{p}")?;
            } else {
                write!(f, " {p}")?;
            }
        }
        Ok(())
    }
}

/// Whitespace tokens of a raw line, tags and source included.
///
/// This is the view command lookup works on: the dialects decide which
/// leading tokens to skip.
pub fn tokens(raw: &str) -> Vec<&str> {
    raw.split(' ').filter(|t| !t.is_empty()).collect()
}

fn parse_tags(block: &str) -> Vec<(String, Option<String>)> {
    block
        .split(';')
        .filter(|t| !t.is_empty())
        .map(|t| match t.split_once('=') {
            Some((k, v)) => (k.to_owned(), Some(unescape_tag_value(v))),
            None => (t.to_owned(), None),
        })
        .collect()
}

fn unescape_tag_value(v: &str) -> String {
    let mut out = String::with_capacity(v.len());
    let mut chars = v.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn escape_tag_value(v: &str) -> String {
    let mut out = String::with_capacity(v.len());
    for c in v.chars() {
        match c {
            ';' => out.push_str("\\:"),
            ' ' => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inspircd_uid() {
        let line = Line::parse(
            ":9XA UID 9XAAAAAAB 1700000000 alice host.example 9XAAAAAAB + * 203.0.113.5 1700000000 +i :Alice\r\n",
        )
        .unwrap();
        assert_eq!(line.source.as_deref(), Some("9XA"));
        assert_eq!(line.command, "UID");
        assert_eq!(line.params.len(), 11);
        assert_eq!(line.param(2), Some("alice"));
        assert_eq!(line.param(7), Some("203.0.113.5"));
        assert_eq!(line.trailing(), Some("Alice"));
    }

    #[test]
    fn strips_and_unescapes_tags() {
        let line =
            Line::parse("@s2s-md/webirc=0;s2s-md/certfp=ab\\scd;flag :001AAAAAA QUIT :gone away")
                .unwrap();
        assert_eq!(line.tag("s2s-md/certfp"), Some("ab cd"));
        assert_eq!(line.tag("flag"), Some(""));
        assert_eq!(line.tag("missing"), None);
        assert_eq!(line.command, "QUIT");
        assert_eq!(line.params, vec!["gone away"]);
    }

    #[test]
    fn empty_trailing_is_kept() {
        let line = Line::parse(":001 NOTICE target :").unwrap();
        assert_eq!(line.params, vec!["target", ""]);
        assert_eq!(line.to_string(), ":001 NOTICE target :");
    }

    #[test]
    fn command_only_and_lowercase() {
        let line = Line::parse("ping").unwrap();
        assert_eq!(line.command, "PING");
        assert!(line.params.is_empty());
        assert!(line.source.is_none());
    }

    #[test]
    fn rejects_empty_and_unterminated() {
        assert!(matches!(
            Line::parse(":only.source"),
            Err(ProtocolError::MissingCommand)
        ));
        assert!(matches!(
            Line::parse("@a=b"),
            Err(ProtocolError::UnterminatedTags)
        ));
        assert!(Line::parse("   ").is_err());
    }

    #[test]
    fn source_name_drops_mask() {
        let line = Line::parse(":alice!a@host PRIVMSG Svc :hi").unwrap();
        assert_eq!(line.source_name(), Some("alice"));
    }

    #[test]
    fn display_reescapes_tags() {
        let line = Line::parse("@k=a\\:b :src CMD x :y z").unwrap();
        assert_eq!(line.to_string(), "@k=a\\:b :src CMD x :y z");
    }

    #[test]
    fn tokens_skip_repeated_spaces() {
        assert_eq!(tokens(":a  B   c"), vec![":a", "B", "c"]);
    }
}
