//! Generic keyed registry with a secondary nickname index.
//!
//! Every network entity (users, admins, clients, clones, reputation records,
//! servers) lives in a [`Registry`]. Lookups by "uid or nick" consult the
//! primary key map first and only then the folded nickname index, so a
//! nickname that happens to spell another entity's UID can never shadow it.

use slsvc_proto::irc_to_lower;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::{debug, error};

/// Something a [`Registry`] can hold.
pub trait Entity {
    /// Label used in log lines ("user", "admin", ...).
    const KIND: &'static str;

    /// Primary key (UID, SID, ...). Immutable for the life of the record.
    fn key(&self) -> &str;

    /// Secondary lookup name, if the entity has one.
    fn nick(&self) -> Option<&str>;

    /// Rename the secondary lookup name.
    fn set_nick(&mut self, nick: &str);
}

/// A keyed collection of `T`.
#[derive(Debug)]
pub struct Registry<T> {
    by_key: HashMap<String, T>,
    by_nick: HashMap<String, String>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            by_key: HashMap::new(),
            by_nick: HashMap::new(),
        }
    }
}

impl<T: Entity> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record. A duplicate key is rejected and logged.
    pub fn insert(&mut self, entity: T) -> bool {
        let key = entity.key().to_string();
        match self.by_key.entry(key.clone()) {
            Entry::Occupied(_) => {
                error!(kind = T::KIND, key = %key, "duplicate insert rejected");
                false
            }
            Entry::Vacant(slot) => {
                let nick = entity.nick().map(str::to_string);
                slot.insert(entity);
                if let Some(nick) = nick {
                    self.index_nick(&nick, &key);
                }
                true
            }
        }
    }

    /// Remove and return the record under `key`.
    pub fn remove(&mut self, key: &str) -> Option<T> {
        let entity = self.by_key.remove(key)?;
        if let Some(nick) = entity.nick() {
            self.unindex_nick(nick, key);
        }
        Some(entity)
    }

    /// Delete the record under `key`. A missing key is logged.
    pub fn delete(&mut self, key: &str) -> bool {
        if self.remove(key).is_some() {
            true
        } else {
            error!(kind = T::KIND, key = %key, "delete of missing key");
            false
        }
    }

    /// Look up by primary key, then by nickname.
    pub fn get(&self, key_or_nick: &str) -> Option<&T> {
        self.by_key
            .get(key_or_nick)
            .or_else(|| self.by_key.get(self.resolve_nick(key_or_nick)?))
    }

    /// Mutable variant of [`Registry::get`].
    pub fn get_mut(&mut self, key_or_nick: &str) -> Option<&mut T> {
        let key = self.resolve(key_or_nick)?.to_string();
        self.by_key.get_mut(&key)
    }

    /// Primary key for a key or nickname.
    pub fn resolve(&self, key_or_nick: &str) -> Option<&str> {
        self.by_key
            .get_key_value(key_or_nick)
            .map(|(k, _)| k.as_str())
            .or_else(|| self.resolve_nick(key_or_nick))
    }

    pub fn exists(&self, key_or_nick: &str) -> bool {
        self.get(key_or_nick).is_some()
    }

    /// Rename the record under `key`, keeping the nickname index in step.
    pub fn update_nickname(&mut self, key: &str, nick: &str) -> bool {
        let Some(entity) = self.by_key.get_mut(key) else {
            return false;
        };
        let old = entity.nick().map(str::to_string);
        entity.set_nick(nick);
        if let Some(old) = old {
            self.unindex_nick(&old, key);
        }
        self.index_nick(nick, key);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.by_key.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.by_key.values_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.by_key.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_key.clear();
        self.by_nick.clear();
    }

    /// Remove every record matching `pred`, returning them.
    pub fn drain_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> Vec<T> {
        let keys: Vec<String> = self
            .by_key
            .iter()
            .filter(|(_, v)| pred(v))
            .map(|(k, _)| k.clone())
            .collect();
        keys.iter().filter_map(|k| self.remove(k)).collect()
    }

    fn resolve_nick(&self, nick: &str) -> Option<&str> {
        self.by_nick.get(&irc_to_lower(nick)).map(String::as_str)
    }

    fn index_nick(&mut self, nick: &str, key: &str) {
        if let Some(prev) = self.by_nick.insert(irc_to_lower(nick), key.to_string())
            && prev != key
        {
            // The newest holder wins the index; the old record stays
            // reachable by key.
            debug!(kind = T::KIND, nick = %nick, previous = %prev, key = %key, "nickname index collision");
        }
    }

    fn unindex_nick(&mut self, nick: &str, key: &str) {
        let folded = irc_to_lower(nick);
        if self.by_nick.get(&folded).is_some_and(|k| k == key) {
            self.by_nick.remove(&folded);
        }
    }
}
