//! Field-level configuration diffing for rehash announcements.
//!
//! Both snapshots are flattened to dotted paths through `serde_json`, so a
//! new config field shows up in announcements without touching this file.

use super::Config;
use serde_json::Value;
use std::collections::BTreeMap;

/// Fields that keep their running value across a rehash. Changing any of
/// them only takes effect after `restart`. The `service.*` entries describe
/// the pseudo-user as introduced on the wire; the nickname is the one field
/// a live rename can change.
///
/// Entries ending in `.` are section prefixes.
pub const PRESERVED_ON_REHASH: &[&str] = &[
    "uplink.",
    "database.path",
    "service.user",
    "service.host",
    "service.realname",
    "service.umodes",
];

/// One changed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    /// Dotted path, e.g. `service.nick`.
    pub path: String,
    pub old: String,
    pub new: String,
}

impl ConfigChange {
    /// Whether this field is held back until restart.
    pub fn requires_restart(&self) -> bool {
        PRESERVED_ON_REHASH.iter().any(|p| {
            if p.ends_with('.') {
                self.path.starts_with(p)
            } else {
                self.path == *p
            }
        })
    }
}

/// Every field whose value differs between `old` and `new`, sorted by path.
/// Secrets are masked.
pub fn diff(old: &Config, new: &Config) -> Vec<ConfigChange> {
    let before = flatten(old);
    let mut after = flatten(new);

    let mut changes = Vec::new();
    for (path, old_value) in before {
        let new_value = after.remove(&path).unwrap_or_else(|| "(unset)".to_string());
        if old_value != new_value {
            changes.push(change(path, old_value, new_value));
        }
    }
    for (path, new_value) in after {
        changes.push(change(path, "(unset)".to_string(), new_value));
    }
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    changes
}

/// Every field of `config` as `(path, value)`, secrets masked.
pub fn describe(config: &Config) -> Vec<(String, String)> {
    flatten(config)
        .into_iter()
        .map(|(path, value)| {
            let value = if is_secret(&path) { "********".to_string() } else { value };
            (path, value)
        })
        .collect()
}

/// Copy the identity-critical fields from the running config into `new`.
pub fn preserve_identity(running: &Config, new: &mut Config) {
    new.uplink = running.uplink.clone();
    new.database.path = running.database.path.clone();
    new.service.user = running.service.user.clone();
    new.service.host = running.service.host.clone();
    new.service.realname = running.service.realname.clone();
    new.service.umodes = running.service.umodes.clone();
}

fn change(path: String, old: String, new: String) -> ConfigChange {
    if is_secret(&path) {
        ConfigChange {
            path,
            old: "********".to_string(),
            new: "********".to_string(),
        }
    } else {
        ConfigChange { path, old, new }
    }
}

fn is_secret(path: &str) -> bool {
    path.ends_with("password") || path.ends_with("client_key")
}

fn flatten(config: &Config) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    match serde_json::to_value(config) {
        Ok(value) => walk("", &value, &mut out),
        Err(e) => tracing::error!(error = %e, "config snapshot failed"),
    }
    out
}

fn walk(prefix: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                walk(&path, v, out);
            }
        }
        Value::Null => {
            out.insert(prefix.to_string(), "(unset)".to_string());
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::SAMPLE;
    use super::*;

    #[test]
    fn identical_configs_have_no_changes() {
        let a = Config::parse(SAMPLE).unwrap();
        assert!(diff(&a, &a.clone()).is_empty());
    }

    #[test]
    fn reports_each_changed_field() {
        let a = Config::parse(SAMPLE).unwrap();
        let mut b = a.clone();
        b.service.nick = "Services".into();
        b.modules.autoload = vec!["jail".into()];
        let changes = diff(&a, &b);
        let paths: Vec<_> = changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["modules.autoload", "service.nick"]);
        assert_eq!(changes[1].old, "Svc");
        assert_eq!(changes[1].new, "Services");
        assert!(!changes[1].requires_restart());
    }

    #[test]
    fn masks_passwords_and_flags_identity() {
        let a = Config::parse(SAMPLE).unwrap();
        let mut b = a.clone();
        b.uplink.password = "other".into();
        b.uplink.sid = "8SV".into();
        let changes = diff(&a, &b);
        let pw = changes.iter().find(|c| c.path == "uplink.password").unwrap();
        assert_eq!(pw.new, "********");
        assert!(changes.iter().all(ConfigChange::requires_restart));
    }

    #[test]
    fn optional_section_appearing() {
        let a = Config::parse(SAMPLE).unwrap();
        let mut b = a.clone();
        b.service.version_check_url = Some("https://example.net/v.json".into());
        let changes = diff(&a, &b);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old, "(unset)");
    }

    #[test]
    fn describe_masks_secrets() {
        let a = Config::parse(SAMPLE).unwrap();
        let fields = describe(&a);
        let get = |p: &str| fields.iter().find(|(k, _)| k == p).map(|(_, v)| v.as_str());
        assert_eq!(get("uplink.password"), Some("********"));
        assert_eq!(get("owner.password"), Some("********"));
        assert_eq!(get("service.nick"), Some("Svc"));
    }

    #[test]
    fn preserve_identity_keeps_link() {
        let a = Config::parse(SAMPLE).unwrap();
        let mut b = a.clone();
        b.uplink.sid = "8SV".into();
        b.service.nick = "Other".into();
        b.service.host = "elsewhere.example.net".into();
        b.service.realname = "Other Services".into();
        preserve_identity(&a, &mut b);
        assert_eq!(b.uplink.sid, "9SV");
        assert_eq!(b.service.nick, "Other");
        assert_eq!(b.service.host, a.service.host);
        assert_eq!(b.service.realname, a.service.realname);
    }

    #[test]
    fn introduced_service_fields_wait_for_restart() {
        let a = Config::parse(SAMPLE).unwrap();
        let mut b = a.clone();
        b.service.host = "elsewhere.example.net".into();
        b.service.umodes = "+io".into();
        b.service.prefix = ".".into();
        let changes = diff(&a, &b);
        let flagged: Vec<_> = changes
            .iter()
            .filter(|c| c.requires_restart())
            .map(|c| c.path.as_str())
            .collect();
        assert_eq!(flagged, vec!["service.host", "service.umodes"]);
    }
}
