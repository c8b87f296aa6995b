//! CTCP framing inside PRIVMSG/NOTICE text.

const DELIM: char = '\x01';

/// A CTCP request or reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ctcp<'a> {
    /// Uppercased verb (`VERSION`, `PING`, ...).
    pub verb: String,
    /// Everything after the verb.
    pub params: Option<&'a str>,
}

impl<'a> Ctcp<'a> {
    /// Parse `text` if it is a CTCP frame. The closing delimiter is
    /// optional, as many clients omit it.
    pub fn parse(text: &'a str) -> Option<Self> {
        let inner = text.strip_prefix(DELIM)?;
        let inner = inner.strip_suffix(DELIM).unwrap_or(inner);
        let (verb, params) = match inner.split_once(' ') {
            Some((v, p)) => (v, Some(p)),
            None => (inner, None),
        };
        if verb.is_empty() {
            return None;
        }
        Some(Self {
            verb: verb.to_ascii_uppercase(),
            params,
        })
    }
}

/// Wrap a reply body for a NOTICE.
pub fn reply(verb: &str, body: &str) -> String {
    if body.is_empty() {
        format!("{DELIM}{verb}{DELIM}")
    } else {
        format!("{DELIM}{verb} {body}{DELIM}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_params() {
        let c = Ctcp::parse("\x01PING 12345\x01").unwrap();
        assert_eq!(c.verb, "PING");
        assert_eq!(c.params, Some("12345"));

        let c = Ctcp::parse("\x01version").unwrap();
        assert_eq!(c.verb, "VERSION");
        assert_eq!(c.params, None);
    }

    #[test]
    fn plain_text_is_not_ctcp() {
        assert!(Ctcp::parse("VERSION").is_none());
        assert!(Ctcp::parse("\x01\x01").is_none());
    }

    #[test]
    fn reply_framing() {
        assert_eq!(reply("TIME", "now"), "\x01TIME now\x01");
        assert_eq!(reply("VERSION", ""), "\x01VERSION\x01");
    }
}
