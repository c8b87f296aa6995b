//! Mode capability tables learned during link negotiation.
//!
//! UnrealIRCd advertises modes ISUPPORT-style in `PROTOCTL`
//! (`PREFIX=(qaohv)~&@%+ CHANMODES=beI,fkL,lH,cdimnprstz`); InspIRCd lists
//! them per mode in `CAPAB CHANMODES`/`CAPAB USERMODES`
//! (`prefix:30000:op=@o list:ban=b simple:moderated=m`). Both fill the same
//! four tables, and every outbound mode change is checked against them.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeTables {
    /// `@` → `o`
    pub prefix_to_mode: HashMap<char, char>,
    /// `o` → `@`
    pub mode_to_prefix: HashMap<char, char>,
    /// Non-prefix channel modes.
    pub channel_modes: HashSet<char>,
    pub user_modes: HashSet<char>,
}

impl ModeTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// `PREFIX=(qaohv)~&@%+`
    pub fn parse_prefix(&mut self, value: &str) {
        let Some((modes, signs)) = value
            .strip_prefix('(')
            .and_then(|rest| rest.split_once(')'))
        else {
            return;
        };
        self.prefix_to_mode.clear();
        self.mode_to_prefix.clear();
        for (mode, sign) in modes.chars().zip(signs.chars()) {
            self.prefix_to_mode.insert(sign, mode);
            self.mode_to_prefix.insert(mode, sign);
        }
    }

    /// `CHANMODES=A,B,C,D`; every group is a valid channel mode.
    pub fn parse_chanmodes(&mut self, value: &str) {
        self.channel_modes = letters(value);
    }

    /// `USERMODES=...`, grouped or flat.
    pub fn parse_usermodes(&mut self, value: &str) {
        self.user_modes = letters(value);
    }

    /// Feed one ISUPPORT-style `KEY=value` token. Returns whether it was a
    /// mode table.
    pub fn apply_isupport(&mut self, token: &str) -> bool {
        match token.split_once('=') {
            Some(("PREFIX", v)) => self.parse_prefix(v),
            Some(("CHANMODES", v)) => self.parse_chanmodes(v),
            Some(("USERMODES", v)) => self.parse_usermodes(v),
            _ => return false,
        }
        true
    }

    /// InspIRCd `CAPAB CHANMODES` list.
    pub fn parse_insp_chanmodes(&mut self, list: &str) {
        self.channel_modes.clear();
        self.prefix_to_mode.clear();
        self.mode_to_prefix.clear();
        for entry in list.split_whitespace() {
            let Some((kind, value)) = entry.split_once('=') else {
                continue;
            };
            let mut chars = value.chars();
            match (kind.starts_with("prefix:"), chars.next(), chars.next()) {
                (true, Some(sign), Some(mode)) => {
                    self.prefix_to_mode.insert(sign, mode);
                    self.mode_to_prefix.insert(mode, sign);
                }
                (false, Some(mode), None) => {
                    self.channel_modes.insert(mode);
                }
                _ => {}
            }
        }
    }

    /// InspIRCd `CAPAB USERMODES` list.
    pub fn parse_insp_usermodes(&mut self, list: &str) {
        self.user_modes = list
            .split_whitespace()
            .filter_map(|entry| entry.split_once('=').map(|(_, v)| v))
            .filter(|v| v.chars().count() == 1)
            .filter_map(|v| v.chars().next())
            .collect();
    }

    pub fn is_channel_mode(&self, mode: char) -> bool {
        self.channel_modes.contains(&mode) || self.mode_to_prefix.contains_key(&mode)
    }

    pub fn is_user_mode(&self, mode: char) -> bool {
        self.user_modes.contains(&mode)
    }

    /// First letter in `change` that was never advertised for channels.
    pub fn invalid_channel_mode(&self, change: &str) -> Option<char> {
        mode_letters(change).find(|&m| !self.is_channel_mode(m))
    }

    /// First letter in `change` that was never advertised for users.
    pub fn invalid_user_mode(&self, change: &str) -> Option<char> {
        mode_letters(change).find(|&m| !self.is_user_mode(m))
    }

    /// Split a member token like `@+001AAAAAB` into (modes, rest).
    pub fn strip_prefixes<'a>(&self, token: &'a str) -> (String, &'a str) {
        let rest = token.trim_start_matches(|c| self.prefix_to_mode.contains_key(&c));
        let modes = token[..token.len() - rest.len()]
            .chars()
            .filter_map(|c| self.prefix_to_mode.get(&c).copied())
            .collect();
        (modes, rest)
    }
}

fn letters(value: &str) -> HashSet<char> {
    value.chars().filter(char::is_ascii_alphabetic).collect()
}

fn mode_letters(change: &str) -> impl Iterator<Item = char> + '_ {
    change.chars().filter(|c| *c != '+' && *c != '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isupport_tables() {
        let mut t = ModeTables::new();
        assert!(t.apply_isupport("PREFIX=(qaohv)~&@%+"));
        assert!(t.apply_isupport("CHANMODES=beI,fkL,lH,cdimnprstzCDGKMNOPQRSTVZ"));
        assert!(t.apply_isupport("USERMODES=diopqrstwxzBDGHIRSTWZ"));
        assert!(!t.apply_isupport("SID=001"));

        assert_eq!(t.prefix_to_mode.get(&'@'), Some(&'o'));
        assert_eq!(t.mode_to_prefix.get(&'v'), Some(&'+'));
        assert!(t.is_channel_mode('m'));
        assert!(t.is_channel_mode('o'));
        assert!(t.is_user_mode('x'));
        assert!(!t.is_user_mode('y'));
    }

    #[test]
    fn inspircd_capab_lists() {
        let mut t = ModeTables::new();
        t.parse_insp_chanmodes(
            "list:ban=b param:key=k prefix:30000:op=@o prefix:10000:voice=+v simple:moderated=m",
        );
        t.parse_insp_usermodes("param-set:snomask=s simple:invisible=i simple:oper=o");
        assert_eq!(t.prefix_to_mode.get(&'@'), Some(&'o'));
        assert!(t.is_channel_mode('b'));
        assert!(t.is_channel_mode('k'));
        assert!(t.is_channel_mode('v'));
        assert!(!t.is_channel_mode('z'));
        assert!(t.is_user_mode('i') && t.is_user_mode('s'));
    }

    #[test]
    fn validation_reports_first_unknown() {
        let mut t = ModeTables::new();
        t.parse_chanmodes("b,k,l,imnst");
        assert_eq!(t.invalid_channel_mode("+nt-s"), None);
        assert_eq!(t.invalid_channel_mode("+nQ"), Some('Q'));
        // Nothing negotiated yet: everything is unknown.
        assert_eq!(ModeTables::new().invalid_user_mode("+i"), Some('i'));
    }

    #[test]
    fn member_prefix_split() {
        let mut t = ModeTables::new();
        t.parse_prefix("(ov)@+");
        assert_eq!(t.strip_prefixes("@+001AAAAAB"), ("ov".to_string(), "001AAAAAB"));
        assert_eq!(t.strip_prefixes("001AAAAAC"), (String::new(), "001AAAAAC"));
    }
}
