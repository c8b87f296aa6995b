//! Admin sessions and client accounts.

use super::usage;
use crate::commands::{Invocation, MAX_LEVEL, reply};
use crate::db::{AdminRecord, DbError};
use crate::handlers::bind_admin;
use crate::security::secrets_match;
use crate::session::Services;
use crate::state::Client;
use std::sync::Arc;
use tracing::{info, warn};

pub(super) async fn auth(svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
    let (Some(name), Some(password)) = (inv.arg(0), inv.arg(1)) else {
        usage(svc, inv);
        return Ok(());
    };
    if let Some(level) = inv.level {
        reply(svc, inv, &format!("You are already authenticated (level {level})."));
        return Ok(());
    }

    match svc.db.admins().verify(name, password).await {
        Ok(record) => open_session(svc, inv, &record, "auth").await,
        Err(DbError::AdminNotFound(_) | DbError::InvalidPassword) => {
            warn!(uid = %inv.uid, nick = %inv.nick, account = %name, "authentication failed");
            svc.db.logs().audit(name, "auth.failed", Some(&inv.nick)).await?;
            reply(svc, inv, "Authentication failed.");
            svc.announce(&format!("Failed authentication for {name} from {}", inv.nick));
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Create the first administrator from the `[owner]` block.
pub(super) async fn firstauth(svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
    let (Some(name), Some(password)) = (inv.arg(0), inv.arg(1)) else {
        usage(svc, inv);
        return Ok(());
    };
    if svc.db.admins().count().await? > 0 {
        reply(svc, inv, "firstauth is disabled once an administrator exists.");
        return Ok(());
    }
    let config = svc.config();
    let Some(owner) = config.owner.as_ref() else {
        reply(svc, inv, "No owner is configured.");
        return Ok(());
    };
    if !name.eq_ignore_ascii_case(&owner.name) || !secrets_match(password, &owner.password) {
        warn!(uid = %inv.uid, nick = %inv.nick, "firstauth with wrong owner credentials");
        reply(svc, inv, "Authentication failed.");
        return Ok(());
    }

    let record = svc
        .db
        .admins()
        .create(&owner.name, password, MAX_LEVEL, Some("firstauth"))
        .await?;
    info!(account = %record.name, "owner account created");
    open_session(svc, inv, &record, "firstauth").await
}

async fn open_session(
    svc: &Services,
    inv: &Invocation,
    record: &AdminRecord,
    action: &str,
) -> anyhow::Result<()> {
    let host = {
        let mut regs = svc.matrix.lock();
        bind_admin(&mut regs, &inv.uid, &record.name, record.level, &record.language);
        regs.users
            .get(&inv.uid)
            .map(|u| (u.hostname.clone(), u.vhost.clone()))
    };
    if let Some((hostname, vhost)) = host {
        svc.db.admins().set_host(&record.name, &hostname, &vhost).await?;
    }
    svc.db.logs().audit(&record.name, action, Some(&inv.nick)).await?;
    info!(uid = %inv.uid, nick = %inv.nick, account = %record.name, level = record.level, "admin authenticated");
    reply(
        svc,
        inv,
        &format!("Authenticated as \x02{}\x02 (level {}).", record.name, record.level),
    );
    svc.announce(&format!(
        "{} authenticated as {} (level {})",
        inv.nick, record.name, record.level
    ));
    Ok(())
}

pub(super) async fn deauth(svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
    let admin = svc.matrix.lock().admins.remove(&inv.uid);
    let Some(admin) = admin else {
        reply(svc, inv, "You are not authenticated.");
        return Ok(());
    };
    svc.db.logs().audit(&admin.account, "deauth", Some(&inv.nick)).await?;
    reply(svc, inv, "You are no longer authenticated.");
    svc.announce(&format!("{} deauthenticated from {}", inv.nick, admin.account));
    Ok(())
}

/// Register an account named after the sender's nickname.
pub(super) async fn register(svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
    let Some(password) = inv.arg(0) else {
        usage(svc, inv);
        return Ok(());
    };
    if svc.matrix.lock().clients.exists(&inv.uid) {
        reply(svc, inv, "You are already identified.");
        return Ok(());
    }
    match svc.db.clients().register(&inv.nick, password, inv.arg(1)).await {
        Ok(account) => {
            svc.db
                .logs()
                .audit(&account.account, "register", Some(&inv.nick))
                .await?;
            login(svc, inv, &account.account);
            reply(
                svc,
                inv,
                &format!("Account \x02{}\x02 registered; you are now identified.", account.account),
            );
            Ok(())
        }
        Err(DbError::AccountExists(name)) => {
            reply(svc, inv, &format!("Account \x02{name}\x02 is already registered."));
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub(super) async fn identify(svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
    let (Some(name), Some(password)) = (inv.arg(0), inv.arg(1)) else {
        usage(svc, inv);
        return Ok(());
    };
    match svc.db.clients().identify(name, password).await {
        Ok(account) => {
            login(svc, inv, &account.account);
            reply(svc, inv, &format!("You are now identified as \x02{}\x02.", account.account));
            Ok(())
        }
        Err(DbError::AccountNotFound(_) | DbError::InvalidPassword) => {
            warn!(uid = %inv.uid, nick = %inv.nick, account = %name, "identify failed");
            reply(svc, inv, "Invalid account or password.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub(super) fn logout(svc: &Arc<Services>, inv: &Invocation) {
    let client = {
        let mut regs = svc.matrix.lock();
        if let Some(user) = regs.users.get_mut(&inv.uid) {
            user.account = None;
        }
        regs.clients.remove(&inv.uid)
    };
    match client {
        Some(client) => {
            let me = svc.identity();
            svc.send(svc.protocol.account_logout(&me, &inv.uid));
            info!(uid = %inv.uid, account = %client.account, "client logged out");
            reply(svc, inv, "You are now logged out.");
        }
        None => reply(svc, inv, "You are not identified."),
    }
}

/// Bind the account session and log the user in network-wide.
fn login(svc: &Services, inv: &Invocation, account: &str) {
    let bound = {
        let mut regs = svc.matrix.lock();
        let client = regs.users.get(&inv.uid).map(|user| Client::bind(user, account));
        match client {
            Some(client) => {
                regs.clients.remove(&client.uid);
                if let Some(user) = regs.users.get_mut(&inv.uid) {
                    user.account = Some(account.to_string());
                }
                regs.clients.insert(client)
            }
            None => false,
        }
    };
    if bound {
        let me = svc.identity();
        svc.send(svc.protocol.sasl_login(&me, "*", &inv.uid, account));
        info!(uid = %inv.uid, nick = %inv.nick, account = %account, "client identified");
    }
}
