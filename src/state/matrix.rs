//! The shared network state.
//!
//! All registries sit behind one `parking_lot::Mutex`. Its guard is `!Send`,
//! so holding it across an `.await` in a spawned task is a compile error:
//! database, HTTP and TLS work always happens after the guard is dropped.

use super::{
    Admin, ChannelRegistry, Client, CloneUser, Registry, Reputation, Server, User,
    entities::apply_mode_change,
};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use tracing::{debug, info};

/// Every entity registry.
#[derive(Debug, Default)]
pub struct Registries {
    pub users: Registry<User>,
    pub channels: ChannelRegistry,
    pub admins: Registry<Admin>,
    pub clients: Registry<Client>,
    pub clones: Registry<CloneUser>,
    pub reputations: Registry<Reputation>,
    pub servers: Registry<Server>,
}

/// What a user removal touched.
#[derive(Debug, Default)]
pub struct Departure {
    pub user: Option<User>,
    pub channels: Vec<String>,
    pub was_admin: bool,
    pub was_client: bool,
    pub was_jailed: bool,
}

impl Registries {
    /// Remove a user and every record that refers to it.
    pub fn remove_user(&mut self, uid: &str) -> Departure {
        let Some(key) = self.users.resolve(uid).map(str::to_string) else {
            self.users.delete(uid);
            return Departure::default();
        };
        let user = self.users.remove(&key);
        let channels = self.channels.part_all(&key);
        let departure = Departure {
            user,
            channels,
            was_admin: self.admins.remove(&key).is_some(),
            was_client: self.clients.remove(&key).is_some(),
            was_jailed: self.reputations.remove(&key).is_some(),
        };
        if let Some(clone) = self.clones.get_mut(&key) {
            clone.connected = false;
            clone.channels.clear();
        }
        debug!(uid = %key, channels = departure.channels.len(), "user removed");
        departure
    }

    /// Change a user's nickname everywhere it is mirrored.
    pub fn rename_user(&mut self, uid: &str, nick: &str) -> bool {
        if !self.users.update_nickname(uid, nick) {
            return false;
        }
        if self.admins.exists(uid) {
            self.admins.update_nickname(uid, nick);
        }
        if self.clients.exists(uid) {
            self.clients.update_nickname(uid, nick);
        }
        if self.reputations.exists(uid) {
            self.reputations.update_nickname(uid, nick);
        }
        if self.clones.exists(uid) {
            self.clones.update_nickname(uid, nick);
        }
        true
    }

    /// Apply a user-mode change string to a user.
    pub fn update_user_mode(&mut self, uid: &str, change: &str) -> bool {
        match self.users.get_mut(uid) {
            Some(user) => {
                apply_mode_change(&mut user.modes, change);
                true
            }
            None => false,
        }
    }

    /// Remove `sid`, every server behind it and all their users.
    pub fn split_server(&mut self, sid: &str) -> (Vec<Server>, Vec<User>) {
        let mut doomed: HashSet<String> = HashSet::new();
        if let Some(key) = self.servers.resolve(sid) {
            doomed.insert(key.to_string());
        } else {
            doomed.insert(sid.to_string());
        }
        loop {
            let more: Vec<String> = self
                .servers
                .iter()
                .filter(|s| {
                    !doomed.contains(&s.sid)
                        && s.parent.as_ref().is_some_and(|p| doomed.contains(p))
                })
                .map(|s| s.sid.clone())
                .collect();
            if more.is_empty() {
                break;
            }
            doomed.extend(more);
        }

        let servers = self.servers.drain_where(|s| doomed.contains(&s.sid));
        let uids: Vec<String> = self
            .users
            .iter()
            .filter(|u| doomed.contains(u.server()))
            .map(|u| u.uid.clone())
            .collect();
        let users = uids
            .iter()
            .filter_map(|uid| self.remove_user(uid).user)
            .collect::<Vec<_>>();

        info!(
            servers = servers.len(),
            users = users.len(),
            "netsplit processed"
        );
        (servers, users)
    }

    /// Forget the network view before a relink. Clones stay known but
    /// disconnected.
    pub fn clear_network(&mut self) {
        self.users.clear();
        self.channels.clear();
        self.admins.clear();
        self.clients.clear();
        self.reputations.clear();
        self.servers.clear();
        for clone in self.clones.iter_mut() {
            clone.connected = false;
            clone.channels.clear();
        }
    }
}

/// Owner of [`Registries`].
#[derive(Debug, Default)]
pub struct Matrix {
    inner: Mutex<Registries>,
}

impl Matrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every registry. Keep the guard short-lived.
    pub fn lock(&self) -> MutexGuard<'_, Registries> {
        self.inner.lock()
    }
}
