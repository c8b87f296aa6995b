//! Channel membership tracking.
//!
//! Channels exist only while they have members: the first join creates the
//! record and the last part removes it.

use slsvc_proto::casemap::is_channel_name;
use slsvc_proto::irc_to_lower;
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Folded name.
    pub name: String,
    pub members: HashSet<String>,
}

impl Channel {
    pub fn new(name: &str) -> Self {
        Self {
            name: irc_to_lower(name),
            members: HashSet::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, Channel>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an empty channel record. Duplicate names are rejected.
    pub fn insert(&mut self, channel: Channel) -> bool {
        if self.channels.contains_key(&channel.name) {
            error!(channel = %channel.name, "duplicate channel insert rejected");
            return false;
        }
        self.channels.insert(channel.name.clone(), channel);
        true
    }

    pub fn delete(&mut self, name: &str) -> bool {
        if self.channels.remove(&irc_to_lower(name)).is_some() {
            true
        } else {
            error!(channel = %name, "delete of missing channel");
            false
        }
    }

    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&irc_to_lower(name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.channels.contains_key(&irc_to_lower(name))
    }

    /// Add `uid` to `name`, creating the channel on first join. Returns
    /// false for an invalid name or an existing member.
    pub fn join(&mut self, name: &str, uid: &str) -> bool {
        if !is_channel_name(name) {
            warn!(channel = %name, uid = %uid, "join to invalid channel name ignored");
            return false;
        }
        let key = irc_to_lower(name);
        let channel = self
            .channels
            .entry(key.clone())
            .or_insert_with(|| Channel::new(&key));
        channel.members.insert(uid.to_string())
    }

    /// Remove `uid` from `name`, deleting the channel once empty.
    pub fn part(&mut self, name: &str, uid: &str) -> bool {
        let key = irc_to_lower(name);
        let Some(channel) = self.channels.get_mut(&key) else {
            debug!(channel = %name, uid = %uid, "part from unknown channel");
            return false;
        };
        let removed = channel.members.remove(uid);
        if channel.members.is_empty() {
            self.channels.remove(&key);
        }
        removed
    }

    /// Remove `uid` from every channel. Returns the channels it left.
    pub fn part_all(&mut self, uid: &str) -> Vec<String> {
        let mut left = Vec::new();
        self.channels.retain(|name, channel| {
            if channel.members.remove(uid) {
                left.push(name.clone());
            }
            !channel.members.is_empty()
        });
        left
    }

    /// Channels `uid` is in.
    pub fn channels_of(&self, uid: &str) -> Vec<&str> {
        self.channels
            .values()
            .filter(|c| c.members.contains(uid))
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn is_member(&self, name: &str, uid: &str) -> bool {
        self.get(name).is_some_and(|c| c.members.contains(uid))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_then_part_prunes() {
        let mut chans = ChannelRegistry::new();
        assert!(chans.join("#Ops", "001A"));
        assert!(chans.exists("#ops"));
        assert!(chans.part("#OPS", "001A"));
        assert!(!chans.exists("#ops"));
        assert!(chans.is_empty());
    }

    #[test]
    fn membership_is_deduplicated() {
        let mut chans = ChannelRegistry::new();
        assert!(chans.join("#a", "001A"));
        assert!(!chans.join("#A", "001A"));
        assert_eq!(chans.get("#a").unwrap().members.len(), 1);
    }

    #[test]
    fn invalid_names_never_create() {
        let mut chans = ChannelRegistry::new();
        assert!(!chans.join("ops", "001A"));
        assert!(!chans.join("#", "001A"));
        assert!(chans.is_empty());
    }

    #[test]
    fn part_all_leaves_other_members() {
        let mut chans = ChannelRegistry::new();
        chans.join("#a", "001A");
        chans.join("#a", "001B");
        chans.join("#b", "001A");
        let mut left = chans.part_all("001A");
        left.sort();
        assert_eq!(left, vec!["#a", "#b"]);
        assert!(chans.exists("#a"));
        assert!(!chans.exists("#b"));
        assert!(chans.channels_of("001A").is_empty());
    }

    #[test]
    fn duplicate_insert_and_missing_delete() {
        let mut chans = ChannelRegistry::new();
        assert!(chans.insert(Channel::new("#x")));
        assert!(!chans.insert(Channel::new("#X")));
        assert!(chans.delete("#x"));
        assert!(!chans.delete("#x"));
    }
}
