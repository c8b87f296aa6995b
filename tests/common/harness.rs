//! In-process services fed raw lines.

use slsvcd::config::Config;
use slsvcd::db::Database;
use slsvcd::handlers;
use slsvcd::session::{Receivers, Services};
use std::sync::Arc;

/// Services without a socket: lines go in through the handler dispatcher,
/// outbound lines are collected from the queue.
pub struct Harness {
    pub svc: Arc<Services>,
    rx: Receivers,
}

impl Harness {
    pub async fn new(dialect: &str) -> anyhow::Result<Self> {
        let config = Config::parse(&super::config_toml(dialect, 7000, ":memory:"))?;
        let db = Database::new(":memory:").await?;
        let (svc, rx) = Services::with_database(config, None, db);
        Ok(Self { svc, rx })
    }

    /// Feed one raw uplink line.
    pub async fn feed(&self, raw: &str) -> anyhow::Result<()> {
        handlers::dispatch(&self.svc, raw).await?;
        Ok(())
    }

    pub async fn feed_all(&self, lines: &[&str]) -> anyhow::Result<()> {
        for raw in lines {
            self.feed(raw).await?;
        }
        Ok(())
    }

    /// Everything queued for the uplink since the last call.
    pub fn sent(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.rx.outbound.try_recv() {
            lines.push(line);
        }
        lines
    }

    /// Negotiate an InspIRCd link with hub `001` and finish its burst.
    #[allow(dead_code)]
    pub async fn link_inspircd(&mut self) -> anyhow::Result<()> {
        self.feed_all(&[
            "CAPAB START 1205",
            "CAPAB CHANMODES :list:ban=b prefix:30000:op=@o prefix:10000:voice=+v simple:noextmsg=n simple:topiclock=t",
            "CAPAB USERMODES :simple:invisible=i simple:oper=o simple:servprotect=k",
            "CAPAB CAPABILITIES :CASEMAPPING=rfc1459 PROTOCOL=1205",
            "CAPAB END",
            "SERVER irc.example.net linkpass 0 001 :Example hub",
            ":001 BURST 1700000000",
            ":001 ENDBURST",
        ])
        .await?;
        self.sent();
        Ok(())
    }

    /// Negotiate an UnrealIRCd link with hub `001` and finish its burst.
    #[allow(dead_code)]
    pub async fn link_unreal(&mut self) -> anyhow::Result<()> {
        self.feed_all(&[
            "PASS :linkpass",
            "PROTOCTL EAUTH=irc.example.net,6100 SID=001",
            "PROTOCTL NOQUIT NICKv2 SJOIN SJOIN2 UMODE2 VL SJ3 TKLEXT TKLEXT2 NICKIP ESVID MLOCK EXTSWHOIS",
            "PROTOCTL CHANMODES=beI,fkL,lH,cdimnprstzCDGKMNOPQRSTVZ USERMODES=diopqrstwxzBDGHIRSTWZ PREFIX=(qaohv)~&@%+",
            "SERVER irc.example.net 1 :U6100-Fhin6XeOoE-001 Example hub",
            ":001 EOS",
        ])
        .await?;
        self.sent();
        Ok(())
    }

    /// Introduce an InspIRCd user from hub `001`.
    #[allow(dead_code)]
    pub async fn insp_user(&self, uid: &str, nick: &str) -> anyhow::Result<()> {
        self.feed(&format!(
            ":001 UID {uid} 1700000000 {nick} host.example.org cloak.example.org {nick} 192.0.2.10 1700000000 +i :{nick} real"
        ))
        .await
    }

    /// Private message from `uid` to the service.
    #[allow(dead_code)]
    pub async fn tell(&self, uid: &str, text: &str) -> anyhow::Result<()> {
        let service = self.svc.identity().service_uid;
        self.feed(&format!(":{uid} PRIVMSG {service} :{text}")).await
    }
}
