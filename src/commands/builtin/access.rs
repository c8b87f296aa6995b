//! Access control: admin records and certificate bindings.
//!
//! An editor only touches records at or below its own level, never grants
//! above its own level and never raises its own level.

use super::usage;
use crate::commands::{Invocation, MAX_LEVEL, reply};
use crate::db::{AdminRecord, DbError};
use crate::session::Services;
use crate::state::Admin;
use std::sync::Arc;
use tracing::info;

/// Placeholder password meaning "keep the current one".
const KEEP_PASSWORD: &str = "*";

fn editor(svc: &Services, inv: &Invocation) -> Option<Admin> {
    svc.matrix.lock().admins.get(&inv.uid).cloned()
}

fn parse_level(raw: &str) -> Option<u8> {
    raw.parse().ok().filter(|l| *l <= MAX_LEVEL)
}

/// Why `editor` may not touch `target`, if it may not.
fn outranked(editor: &Admin, target: &AdminRecord) -> Option<String> {
    (target.level > editor.level).then(|| {
        format!(
            "\x02{}\x02 holds level {}, above your level {}.",
            target.name, target.level, editor.level
        )
    })
}

pub(super) async fn addaccess(svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
    let (Some(name), Some(raw_level), Some(password)) = (inv.arg(0), inv.arg(1), inv.arg(2)) else {
        usage(svc, inv);
        return Ok(());
    };
    let Some(editor) = editor(svc, inv) else {
        reply(svc, inv, "You are not authenticated.");
        return Ok(());
    };
    let Some(level) = parse_level(raw_level) else {
        reply(svc, inv, &format!("Level must be between 0 and {MAX_LEVEL}."));
        return Ok(());
    };
    if level > editor.level {
        reply(svc, inv, &format!("You cannot grant a level above your own ({}).", editor.level));
        return Ok(());
    }

    match svc
        .db
        .admins()
        .create(name, password, level, Some(&editor.account))
        .await
    {
        Ok(record) => {
            let detail = format!("{} level {}", record.name, record.level);
            svc.db.logs().audit(&editor.account, "addaccess", Some(&detail)).await?;
            info!(editor = %editor.account, admin = %record.name, level, "admin added");
            reply(svc, inv, &format!("Added \x02{}\x02 at level {}.", record.name, level));
            svc.announce(&format!("{} added admin {} at level {}", editor.account, record.name, level));
            Ok(())
        }
        Err(DbError::AdminExists(name)) => {
            reply(svc, inv, &format!("\x02{name}\x02 already has access."));
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub(super) async fn editaccess(svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
    let (Some(name), Some(password), Some(raw_level)) = (inv.arg(0), inv.arg(1), inv.arg(2)) else {
        usage(svc, inv);
        return Ok(());
    };
    let Some(editor) = editor(svc, inv) else {
        reply(svc, inv, "You are not authenticated.");
        return Ok(());
    };
    let Some(level) = parse_level(raw_level) else {
        reply(svc, inv, &format!("Level must be between 0 and {MAX_LEVEL}."));
        return Ok(());
    };
    let Some(target) = svc.db.admins().find_by_name(name).await? else {
        reply(svc, inv, &format!("No admin named \x02{name}\x02."));
        return Ok(());
    };
    if let Some(why) = outranked(&editor, &target) {
        reply(svc, inv, &why);
        return Ok(());
    }
    let is_self = target.name.eq_ignore_ascii_case(&editor.account);
    if is_self && level > target.level {
        reply(svc, inv, "You cannot raise your own level.");
        return Ok(());
    }
    if level > editor.level {
        reply(svc, inv, &format!("You cannot grant a level above your own ({}).", editor.level));
        return Ok(());
    }

    if password != KEEP_PASSWORD {
        svc.db.admins().set_password(&target.name, password).await?;
    }
    svc.db.admins().set_level(&target.name, level).await?;
    {
        let mut regs = svc.matrix.lock();
        for admin in regs
            .admins
            .iter_mut()
            .filter(|a| a.account.eq_ignore_ascii_case(&target.name))
        {
            admin.level = level;
        }
    }

    let detail = format!("{} level {} -> {}", target.name, target.level, level);
    svc.db.logs().audit(&editor.account, "editaccess", Some(&detail)).await?;
    reply(svc, inv, &format!("Updated \x02{}\x02 to level {}.", target.name, level));
    svc.announce(&format!("{} changed admin {}", editor.account, detail));
    Ok(())
}

/// `delaccess <user> <user>`: the name is repeated as confirmation.
pub(super) async fn delaccess(svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
    let (Some(name), Some(confirm)) = (inv.arg(0), inv.arg(1)) else {
        usage(svc, inv);
        return Ok(());
    };
    if !name.eq_ignore_ascii_case(confirm) {
        reply(svc, inv, "The two names differ; nothing removed.");
        return Ok(());
    }
    let Some(editor) = editor(svc, inv) else {
        reply(svc, inv, "You are not authenticated.");
        return Ok(());
    };
    let Some(target) = svc.db.admins().find_by_name(name).await? else {
        reply(svc, inv, &format!("No admin named \x02{name}\x02."));
        return Ok(());
    };
    if target.name.eq_ignore_ascii_case(&editor.account) {
        reply(svc, inv, "You cannot remove your own access.");
        return Ok(());
    }
    if let Some(why) = outranked(&editor, &target) {
        reply(svc, inv, &why);
        return Ok(());
    }

    svc.db.admins().delete(&target.name).await?;
    let ended = svc
        .matrix
        .lock()
        .admins
        .drain_where(|a| a.account.eq_ignore_ascii_case(&target.name));
    for admin in &ended {
        svc.notice(&admin.uid, "Your access has been removed.");
    }

    svc.db
        .logs()
        .audit(&editor.account, "delaccess", Some(&target.name))
        .await?;
    reply(svc, inv, &format!("Removed \x02{}\x02.", target.name));
    svc.announce(&format!("{} removed admin {}", editor.account, target.name));
    Ok(())
}

/// `cert add [user] [fingerprint]` / `cert remove [user]`.
pub(super) async fn cert(svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
    let Some(action) = inv.arg(0).map(str::to_ascii_lowercase) else {
        usage(svc, inv);
        return Ok(());
    };
    let Some(editor) = editor(svc, inv) else {
        reply(svc, inv, "You are not authenticated.");
        return Ok(());
    };
    let name = inv.arg(1).unwrap_or(&editor.account).to_string();
    let Some(target) = svc.db.admins().find_by_name(&name).await? else {
        reply(svc, inv, &format!("No admin named \x02{name}\x02."));
        return Ok(());
    };
    if let Some(why) = outranked(&editor, &target) {
        reply(svc, inv, &why);
        return Ok(());
    }

    match action.as_str() {
        "add" => {
            let fingerprint = inv.arg(2).map(str::to_string).or_else(|| {
                svc.matrix
                    .lock()
                    .users
                    .get(&inv.uid)
                    .and_then(|u| u.fingerprint.clone())
            });
            let Some(fp) = fingerprint else {
                reply(svc, inv, "No fingerprint given and your connection presents none.");
                return Ok(());
            };
            svc.db.admins().set_fingerprint(&target.name, Some(&fp)).await?;
            svc.db
                .logs()
                .audit(&editor.account, "cert.add", Some(&target.name))
                .await?;
            reply(svc, inv, &format!("Certificate bound to \x02{}\x02.", target.name));
        }
        "remove" | "del" => {
            svc.db.admins().set_fingerprint(&target.name, None).await?;
            svc.db
                .logs()
                .audit(&editor.account, "cert.remove", Some(&target.name))
                .await?;
            reply(svc, inv, &format!("Certificate removed from \x02{}\x02.", target.name));
        }
        _ => usage(svc, inv),
    }
    Ok(())
}
