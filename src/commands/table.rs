//! The level-indexed command table.
//!
//! Core commands are registered at startup; modules add theirs on load and
//! lose exactly those on unload.

use std::collections::BTreeMap;
use tracing::error;

/// Internal command a denied invocation is rewritten to.
pub const NOT_ALLOWED: &str = "not_allowed";

/// Highest access level.
pub const MAX_LEVEL: u8 = 5;

/// Who registered a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Core,
    Module(&'static str),
}

/// A command as declared by its owner.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub level: u8,
    /// Usage line shown by `help`.
    pub help: &'static str,
    /// Argument positions masked in the command log.
    pub secret_args: &'static [usize],
}

impl CommandSpec {
    pub const fn new(name: &'static str, level: u8, help: &'static str) -> Self {
        Self {
            name,
            level,
            help,
            secret_args: &[],
        }
    }

    pub const fn secret(mut self, positions: &'static [usize]) -> Self {
        self.secret_args = positions;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CommandEntry {
    pub spec: CommandSpec,
    pub owner: Owner,
}

impl CommandEntry {
    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn level(&self) -> u8 {
        self.spec.level
    }

    /// Whether a sender holding `level` (None: not authenticated) may run
    /// this command.
    pub fn allows(&self, level: Option<u8>) -> bool {
        self.spec.level == 0 || level.is_some_and(|l| l >= self.spec.level)
    }

    /// Arguments with secrets replaced, joined for the command log.
    pub fn masked_args(&self, args: &[String]) -> String {
        args.iter()
            .enumerate()
            .map(|(i, a)| {
                if self.spec.secret_args.contains(&i) {
                    "****"
                } else {
                    a.as_str()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub const CORE_COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("help", 0, "help [command]"),
    CommandSpec::new("auth", 0, "auth <user> <password>").secret(&[1]),
    CommandSpec::new("firstauth", 0, "firstauth <user> <password>").secret(&[1]),
    CommandSpec::new("register", 0, "register <password> [email]").secret(&[0]),
    CommandSpec::new("identify", 0, "identify <account> <password>").secret(&[1]),
    CommandSpec::new("logout", 0, "logout"),
    CommandSpec::new("deauth", 1, "deauth"),
    CommandSpec::new("show_modules", 1, "show_modules"),
    CommandSpec::new("show_channels", 1, "show_channels"),
    CommandSpec::new("show_users", 1, "show_users"),
    CommandSpec::new("load", 2, "load <module>"),
    CommandSpec::new("unload", 2, "unload <module>"),
    CommandSpec::new("reload", 2, "reload <module>"),
    CommandSpec::new("show_timers", 2, "show_timers"),
    CommandSpec::new("show_threads", 2, "show_threads"),
    CommandSpec::new("show_admins", 2, "show_admins"),
    CommandSpec::new("show_clients", 2, "show_clients"),
    CommandSpec::new("join", 2, "join <#channel>"),
    CommandSpec::new("part", 2, "part <#channel>"),
    CommandSpec::new("addaccess", 3, "addaccess <user> <level> <password>").secret(&[2]),
    CommandSpec::new("editaccess", 3, "editaccess <user> <password> <level>").secret(&[1]),
    CommandSpec::new("delaccess", 3, "delaccess <user> <user>"),
    CommandSpec::new("show_config", 3, "show_config"),
    CommandSpec::new("cert", 3, "cert <add|remove> [user] [fingerprint]"),
    CommandSpec::new("rehash", 4, "rehash"),
    CommandSpec::new("restart", 4, "restart [reason]"),
    CommandSpec::new("raw", 4, "raw <line>"),
    CommandSpec::new("quit", 5, "quit [reason]"),
];

/// Command name → entry.
#[derive(Debug, Default)]
pub struct CommandTable {
    entries: BTreeMap<String, CommandEntry>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table holding the core command set.
    pub fn with_core() -> Self {
        let mut table = Self::new();
        for spec in CORE_COMMANDS {
            table.register(Owner::Core, *spec);
        }
        table
    }

    /// Add a command. A name already taken is refused.
    pub fn register(&mut self, owner: Owner, spec: CommandSpec) -> bool {
        let key = spec.name.to_ascii_lowercase();
        if key == NOT_ALLOWED || self.entries.contains_key(&key) {
            error!(command = %key, owner = ?owner, "command name already registered");
            return false;
        }
        self.entries.insert(key, CommandEntry { spec, owner });
        true
    }

    /// Drop every command `owner` registered.
    pub fn unregister_owner(&mut self, owner: Owner) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.owner != owner);
        before - self.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<&CommandEntry> {
        self.entries.get(&name.to_ascii_lowercase())
    }

    /// Commands runnable at `level`, lowest level first.
    pub fn visible_to(&self, level: Option<u8>) -> Vec<&CommandEntry> {
        let mut visible: Vec<&CommandEntry> =
            self.entries.values().filter(|e| e.allows(level)).collect();
        visible.sort_by_key(|e| (e.level(), e.name()));
        visible
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_monotonic() {
        let table = CommandTable::with_core();
        let anonymous = table.visible_to(None).len();
        let mut previous = anonymous;
        for level in 0..=MAX_LEVEL {
            let count = table.visible_to(Some(level)).len();
            assert!(count >= previous);
            previous = count;
        }
        assert_eq!(table.visible_to(Some(MAX_LEVEL)).len(), table.len());
        assert!(table.visible_to(None).iter().all(|e| e.level() == 0));
        assert_eq!(table.visible_to(Some(0)).len(), anonymous);
    }

    #[test]
    fn unauthenticated_only_reaches_level_zero() {
        let table = CommandTable::with_core();
        assert!(table.get("help").unwrap().allows(None));
        assert!(!table.get("deauth").unwrap().allows(None));
        assert!(!table.get("rehash").unwrap().allows(Some(3)));
        assert!(table.get("rehash").unwrap().allows(Some(4)));
        assert!(table.get("QUIT").unwrap().allows(Some(5)));
    }

    #[test]
    fn module_commands_leave_with_their_owner() {
        let mut table = CommandTable::with_core();
        let core = table.len();
        assert!(table.register(Owner::Module("clone"), CommandSpec::new("clone", 3, "clone")));
        assert!(table.register(Owner::Module("jail"), CommandSpec::new("jail", 2, "jail")));
        assert!(!table.register(Owner::Module("jail"), CommandSpec::new("help", 0, "x")));
        assert!(!table.register(Owner::Module("jail"), CommandSpec::new(NOT_ALLOWED, 0, "x")));

        assert_eq!(table.unregister_owner(Owner::Module("clone")), 1);
        assert!(table.get("clone").is_none());
        assert!(table.get("jail").is_some());
        assert_eq!(table.len(), core + 1);
    }

    #[test]
    fn secrets_are_masked() {
        let table = CommandTable::with_core();
        let args = vec!["ops".to_string(), "3".into(), "hunter2".into()];
        assert_eq!(table.get("addaccess").unwrap().masked_args(&args), "ops 3 ****");
    }
}
