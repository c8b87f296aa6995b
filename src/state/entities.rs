//! Network entity records.

use super::registry::Entity;

/// A live network user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub uid: String,
    pub nick: String,
    pub username: String,
    pub realname: String,
    /// Real hostname.
    pub hostname: String,
    /// Displayed hostname.
    pub vhost: String,
    /// User modes without the leading `+`.
    pub modes: String,
    pub ip: String,
    pub webirc: bool,
    pub websocket: bool,
    /// Two-letter country code, when the uplink supplies one.
    pub country: Option<String>,
    pub reputation: i32,
    /// Signon time (unix seconds).
    pub connected_at: i64,
    pub fingerprint: Option<String>,
    /// Account name the network has logged the user into.
    pub account: Option<String>,
}

impl User {
    /// SID of the server the user is connected to.
    pub fn server(&self) -> &str {
        self.uid.get(..3).unwrap_or(&self.uid)
    }

    pub fn has_mode(&self, mode: char) -> bool {
        self.modes.contains(mode)
    }

    /// `nick!user@vhost`.
    pub fn mask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.username, self.vhost)
    }
}

impl Entity for User {
    const KIND: &'static str = "user";
    fn key(&self) -> &str {
        &self.uid
    }
    fn nick(&self) -> Option<&str> {
        Some(&self.nick)
    }
    fn set_nick(&mut self, nick: &str) {
        self.nick = nick.to_string();
    }
}

/// An authenticated operator session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admin {
    pub uid: String,
    pub nick: String,
    /// Stored administrator name the session authenticated as.
    pub account: String,
    pub level: u8,
    pub language: String,
}

impl Entity for Admin {
    const KIND: &'static str = "admin";
    fn key(&self) -> &str {
        &self.uid
    }
    fn nick(&self) -> Option<&str> {
        Some(&self.nick)
    }
    fn set_nick(&mut self, nick: &str) {
        self.nick = nick.to_string();
    }
}

/// A registered account bound to a live user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub uid: String,
    pub nick: String,
    pub account: String,
    pub username: String,
    pub hostname: String,
    pub vhost: String,
    pub ip: String,
}

impl Client {
    /// Bind `account` to `user`, mirroring its profile.
    pub fn bind(user: &User, account: &str) -> Self {
        Self {
            uid: user.uid.clone(),
            nick: user.nick.clone(),
            account: account.to_string(),
            username: user.username.clone(),
            hostname: user.hostname.clone(),
            vhost: user.vhost.clone(),
            ip: user.ip.clone(),
        }
    }
}

impl Entity for Client {
    const KIND: &'static str = "client";
    fn key(&self) -> &str {
        &self.uid
    }
    fn nick(&self) -> Option<&str> {
        Some(&self.nick)
    }
    fn set_nick(&mut self, nick: &str) {
        self.nick = nick.to_string();
    }
}

/// A locally generated pseudo-user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneUser {
    pub connected: bool,
    pub uid: String,
    pub nick: String,
    pub username: String,
    pub realname: String,
    pub channels: Vec<String>,
    pub vhost: String,
    pub modes: String,
    pub ip: String,
    pub group: String,
}

impl Entity for CloneUser {
    const KIND: &'static str = "clone";
    fn key(&self) -> &str {
        &self.uid
    }
    fn nick(&self) -> Option<&str> {
        Some(&self.nick)
    }
    fn set_nick(&mut self, nick: &str) {
        self.nick = nick.to_string();
    }
}

/// A user held under reputation sanction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reputation {
    pub user: User,
    /// Release challenge.
    pub code: String,
    /// When the sanction began (unix seconds).
    pub jailed_at: i64,
}

impl Entity for Reputation {
    const KIND: &'static str = "reputation";
    fn key(&self) -> &str {
        &self.user.uid
    }
    fn nick(&self) -> Option<&str> {
        Some(&self.user.nick)
    }
    fn set_nick(&mut self, nick: &str) {
        self.user.nick = nick.to_string();
    }
}

/// A server on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub sid: String,
    pub name: String,
    pub description: String,
    /// SID of the server this one is linked behind; `None` for our uplink.
    pub parent: Option<String>,
}

impl Entity for Server {
    const KIND: &'static str = "server";
    fn key(&self) -> &str {
        &self.sid
    }
    fn nick(&self) -> Option<&str> {
        Some(&self.name)
    }
    fn set_nick(&mut self, nick: &str) {
        self.name = nick.to_string();
    }
}

/// Apply a mode change such as `+iw-x` to a flag string.
///
/// Flags are kept unique and in arrival order. Anything before the first
/// sign is treated as an add.
pub fn apply_mode_change(modes: &mut String, change: &str) {
    let mut adding = true;
    for c in change.chars() {
        match c {
            '+' => adding = true,
            '-' => adding = false,
            c if c.is_ascii_alphabetic() => {
                if adding {
                    if !modes.contains(c) {
                        modes.push(c);
                    }
                } else {
                    modes.retain(|m| m != c);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_changes_apply_in_order() {
        let mut modes = String::from("i");
        apply_mode_change(&mut modes, "+wx-i");
        assert_eq!(modes, "wx");
        apply_mode_change(&mut modes, "+w");
        assert_eq!(modes, "wx");
        apply_mode_change(&mut modes, "-x+o");
        assert_eq!(modes, "wo");
    }

    #[test]
    fn user_server_is_uid_prefix() {
        let user = User {
            uid: "9XAAAAAAB".into(),
            ..Default::default()
        };
        assert_eq!(user.server(), "9XA");
    }

    #[test]
    fn client_mirrors_user() {
        let user = User {
            uid: "001AAAAAA".into(),
            nick: "alice".into(),
            username: "al".into(),
            hostname: "real.host".into(),
            vhost: "cloak.host".into(),
            ip: "198.51.100.7".into(),
            ..Default::default()
        };
        let client = Client::bind(&user, "alice");
        assert_eq!(client.vhost, "cloak.host");
        assert_eq!(client.ip, "198.51.100.7");
        assert_eq!(client.account, "alice");
    }
}
