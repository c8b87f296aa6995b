//! Clone identity generation.
//!
//! Nicknames and UIDs are checked against both live users and existing
//! clones; a taken nickname gets a random suffix and is tried again.

use super::{CloneUser, Registries, UidGenerator};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::warn;

const NICK_STEMS: &[&str] = &[
    "guest", "lurker", "idler", "visitor", "reader", "echo", "drifter", "watcher",
];
const MAX_ATTEMPTS: usize = 32;

/// Build a fresh, not yet connected clone in `group`.
///
/// Returns `None` only if no unique nickname or UID was found within the
/// attempt budget.
pub fn generate_clone(
    regs: &Registries,
    uids: &UidGenerator,
    group: &str,
    host: &str,
) -> Option<CloneUser> {
    let mut rng = rand::thread_rng();
    let stem = NICK_STEMS.choose(&mut rng).copied().unwrap_or("guest");
    let mut nick = format!("{stem}{}", rng.gen_range(100..10_000));

    let mut attempts = 0;
    while nick_taken(regs, &nick) {
        attempts += 1;
        if attempts >= MAX_ATTEMPTS {
            warn!(group = %group, "could not find a free clone nickname");
            return None;
        }
        nick.push(char::from(b'a' + rng.gen_range(0..26)));
    }

    let uid = (0..MAX_ATTEMPTS)
        .map(|_| uids.next())
        .find(|uid| !regs.users.exists(uid) && !regs.clones.exists(uid))?;

    Some(CloneUser {
        connected: false,
        uid,
        username: stem.to_string(),
        realname: format!("{stem} ({group})"),
        channels: Vec::new(),
        vhost: format!("{}.{host}", nick.to_ascii_lowercase()),
        modes: "i".to_string(),
        ip: format!(
            "10.{}.{}.{}",
            rng.gen_range(0..=255),
            rng.gen_range(0..=255),
            rng.gen_range(1..=254)
        ),
        group: group.to_string(),
        nick,
    })
}

fn nick_taken(regs: &Registries, nick: &str) -> bool {
    regs.users.exists(nick) || regs.clones.exists(nick)
}
