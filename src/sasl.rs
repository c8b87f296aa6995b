//! The SASL exchange, services side.
//!
//! The uplink relays each client's `AUTHENTICATE` traffic as frames keyed
//! by the client's UID:
//!
//! - `H`: client host and IP
//! - `S`: mechanism selection (a second `S` replaces the first)
//! - `C`: client data, in 400-byte chunks
//! - `D`: the uplink aborting the exchange
//!
//! A session record lives from its first frame until the exchange is
//! finished or aborted. The record is dropped *before* credentials are
//! checked, so a replayed `C` after a verdict finds nothing to act on.
//!
//! A successful login usually lands before the user's `UID`; the resolved
//! account is parked in [`SaslSessions`] and claimed when the user is
//! introduced.

use crate::db::DbError;
use crate::error::{HandlerError, HandlerResult};
use crate::handlers::bind_admin;
use crate::protocol::SaslFrame;
use crate::session::Services;
use dashmap::DashMap;
use slsvc_proto::sasl::{CONTINUATION, SASL_CHUNK_SIZE, SaslMechanism, decode_plain};
use tracing::{debug, info, warn};

/// Upper bound on buffered client data for one exchange.
const MAX_SASL_BUFFER: usize = 8 * SASL_CHUNK_SIZE;

/// One in-flight exchange.
#[derive(Debug, Clone)]
pub struct SaslSession {
    /// Server to address replies to.
    pub origin: String,
    pub ip: Option<String>,
    pub mechanism: Option<SaslMechanism>,
    /// Certificate fingerprint offered with `S EXTERNAL`.
    pub fingerprint: Option<String>,
    buffer: String,
}

impl SaslSession {
    fn new(origin: &str) -> Self {
        Self {
            origin: origin.to_string(),
            ip: None,
            mechanism: None,
            fingerprint: None,
            buffer: String::new(),
        }
    }
}

/// A login that finished before the user was introduced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLogin {
    pub account: String,
    pub level: u8,
    pub language: String,
}

/// Per-client SASL state.
#[derive(Debug, Default)]
pub struct SaslSessions {
    sessions: DashMap<String, SaslSession>,
    resolved: DashMap<String, ResolvedLogin>,
}

impl SaslSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything about `uid`.
    pub fn remove(&self, uid: &str) {
        self.sessions.remove(uid);
        self.resolved.remove(uid);
    }

    pub fn clear(&self) {
        self.sessions.clear();
        self.resolved.clear();
    }

    /// Claim a parked login for a newly introduced user.
    pub fn take_resolved(&self, uid: &str) -> Option<ResolvedLogin> {
        self.resolved.remove(uid).map(|(_, login)| login)
    }

    pub fn get(&self, uid: &str) -> Option<SaslSession> {
        self.sessions.get(uid).map(|s| s.clone())
    }

    /// In-flight exchanges.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Where the `C` frame leaves an exchange.
enum Step {
    /// More chunks follow.
    Wait,
    /// Client data is complete.
    Finish(SaslSession),
    /// No such exchange.
    Missing,
}

/// Advance the exchange for one relayed frame.
pub async fn handle_frame(svc: &Services, frame: SaslFrame) -> HandlerResult {
    let SaslFrame {
        origin,
        client,
        mode,
        data,
        ext,
    } = frame;

    match mode {
        'H' => {
            let mut session = svc
                .sasl
                .sessions
                .entry(client.clone())
                .or_insert_with(|| SaslSession::new(&origin));
            session.ip = Some(data);
            Ok(())
        }
        'S' => {
            let mechanism = SaslMechanism::parse(&data);
            debug!(uid = %client, mechanism = %mechanism.as_str(), "SASL start");
            let reply = {
                let mut session = svc
                    .sasl
                    .sessions
                    .entry(client.clone())
                    .or_insert_with(|| SaslSession::new(&origin));
                session.origin = origin.clone();
                session.buffer.clear();
                session.mechanism = Some(mechanism.clone());
                match mechanism {
                    SaslMechanism::Plain => Some(CONTINUATION),
                    SaslMechanism::External => {
                        session.fingerprint =
                            ext.filter(|fp| !fp.is_empty() && fp != CONTINUATION);
                        session.fingerprint.as_ref().map(|_| CONTINUATION)
                    }
                    SaslMechanism::Unknown(_) => None,
                }
            };
            match (reply, mechanism) {
                (Some(marker), _) => reply_frame(svc, &origin, &client, 'C', marker),
                (None, SaslMechanism::Unknown(name)) => {
                    debug!(uid = %client, mechanism = %name, "unsupported SASL mechanism");
                    svc.sasl.sessions.remove(&client);
                    reply_frame(svc, &origin, &client, 'M', SaslMechanism::supported());
                    reply_frame(svc, &origin, &client, 'D', "F");
                }
                // EXTERNAL without a fingerprint yet: wait for client data.
                (None, _) => {}
            }
            Ok(())
        }
        'C' => match buffer_chunk(svc, &client, &data) {
            Step::Wait => Ok(()),
            Step::Missing => {
                debug!(uid = %client, "SASL data without a session");
                Ok(())
            }
            Step::Finish(session) => finish(svc, &client, session).await,
        },
        'D' => {
            if svc.sasl.sessions.remove(&client).is_some() {
                debug!(uid = %client, reason = %data, "SASL exchange ended by uplink");
            }
            Ok(())
        }
        other => Err(HandlerError::Protocol(format!("unknown SASL mode '{other}'"))),
    }
}

fn buffer_chunk(svc: &Services, client: &str, data: &str) -> Step {
    let Some(mut session) = svc.sasl.sessions.get_mut(client) else {
        return Step::Missing;
    };
    if data != CONTINUATION {
        session.buffer.push_str(data);
    }
    let complete = data.len() < SASL_CHUNK_SIZE || session.buffer.len() > MAX_SASL_BUFFER;
    drop(session);
    if !complete {
        return Step::Wait;
    }
    match svc.sasl.sessions.remove(client) {
        Some((_, session)) => Step::Finish(session),
        None => Step::Missing,
    }
}

/// Check the credentials of a completed exchange and send the verdict.
async fn finish(svc: &Services, client: &str, session: SaslSession) -> HandlerResult {
    let origin = session.origin.clone();
    let verdict = match verify(svc, client, &session).await {
        Ok(verdict) => verdict,
        Err(e) => {
            reply_frame(svc, &origin, client, 'D', "F");
            return Err(e.into());
        }
    };

    let Some(login) = verdict else {
        warn!(uid = %client, ip = ?session.ip, "SASL authentication failed");
        reply_frame(svc, &origin, client, 'D', "F");
        return Ok(());
    };

    let me = svc.identity();
    svc.send(svc.protocol.sasl_login(&me, &origin, client, &login.account));
    reply_frame(svc, &origin, client, 'D', "S");

    let nick = bind_admin(
        &mut svc.matrix.lock(),
        client,
        &login.account,
        login.level,
        &login.language,
    );
    svc.db
        .logs()
        .audit(&login.account, "auth.sasl", Some(client))
        .await?;
    info!(uid = %client, account = %login.account, level = login.level, "SASL authentication succeeded");
    match nick {
        Some(nick) => svc.announce(&format!(
            "{nick} authenticated as {} (level {}) via SASL",
            login.account, login.level
        )),
        None => {
            svc.sasl.resolved.insert(client.to_string(), login);
        }
    }
    Ok(())
}

/// `Ok(None)` is a credential mismatch; `Err` is a storage failure.
async fn verify(
    svc: &Services,
    client: &str,
    session: &SaslSession,
) -> Result<Option<ResolvedLogin>, DbError> {
    match &session.mechanism {
        Some(SaslMechanism::Plain) => {
            let creds = match decode_plain(&session.buffer) {
                Ok(creds) => creds,
                Err(e) => {
                    debug!(uid = %client, error = %e, "bad PLAIN payload");
                    return Ok(None);
                }
            };
            if creds.requests_other_identity() {
                debug!(uid = %client, authzid = %creds.authzid, authcid = %creds.authcid, "ignoring PLAIN authzid");
            }
            match svc.db.admins().verify(&creds.authcid, &creds.password).await {
                Ok(record) => Ok(Some(ResolvedLogin {
                    account: record.name,
                    level: record.level,
                    language: record.language,
                })),
                Err(DbError::AdminNotFound(_) | DbError::InvalidPassword) => Ok(None),
                Err(e) => Err(e),
            }
        }
        Some(SaslMechanism::External) => {
            let fingerprint = session.fingerprint.clone().or_else(|| {
                svc.matrix
                    .lock()
                    .users
                    .get(client)
                    .and_then(|u| u.fingerprint.clone())
            });
            let Some(fp) = fingerprint else {
                return Ok(None);
            };
            Ok(svc
                .db
                .admins()
                .find_by_fingerprint(&fp)
                .await?
                .map(|record| ResolvedLogin {
                    account: record.name,
                    level: record.level,
                    language: record.language,
                }))
        }
        _ => Ok(None),
    }
}

fn reply_frame(svc: &Services, origin: &str, client: &str, mode: char, data: &str) {
    let me = svc.identity();
    svc.send(svc.protocol.sasl_reply(&me, origin, client, mode, data));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{drain, services};
    use crate::config::Dialect;
    use slsvc_proto::sasl::encode_plain;

    fn frame(client: &str, mode: char, data: &str, ext: Option<&str>) -> SaslFrame {
        SaslFrame {
            origin: "irc.example.net".into(),
            client: client.into(),
            mode,
            data: data.into(),
            ext: ext.map(String::from),
        }
    }

    #[tokio::test]
    async fn plain_success_parks_the_login() {
        let (svc, mut rx) = services(Dialect::Unrealircd).await;
        svc.db.admins().create("root", "hunter2", 5, None).await.unwrap();

        handle_frame(&svc, frame("001AAAAAB", 'H', "192.0.2.1", None)).await.unwrap();
        handle_frame(&svc, frame("001AAAAAB", 'S', "PLAIN", None)).await.unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![":9SV SASL irc.example.net 001AAAAAB C +".to_string()]
        );

        let payload = encode_plain("", "root", "hunter2");
        handle_frame(&svc, frame("001AAAAAB", 'C', &payload, None)).await.unwrap();
        assert!(svc.sasl.is_empty());

        let sent = drain(&mut rx);
        assert!(sent.contains(&":9SV SVSLOGIN irc.example.net 001AAAAAB root".to_string()));
        assert!(sent.contains(&":9SV SASL irc.example.net 001AAAAAB D S".to_string()));

        let login = svc.sasl.take_resolved("001AAAAAB").unwrap();
        assert_eq!((login.account.as_str(), login.level), ("root", 5));
    }

    #[tokio::test]
    async fn plain_authzid_never_changes_the_account() {
        let (svc, mut rx) = services(Dialect::Unrealircd).await;
        svc.db.admins().create("root", "hunter2", 5, None).await.unwrap();
        svc.db.admins().create("helper", "other", 1, None).await.unwrap();

        handle_frame(&svc, frame("001AAAAAB", 'S', "PLAIN", None)).await.unwrap();
        let payload = encode_plain("helper", "root", "hunter2");
        handle_frame(&svc, frame("001AAAAAB", 'C', &payload, None)).await.unwrap();

        let sent = drain(&mut rx);
        assert!(sent.contains(&":9SV SVSLOGIN irc.example.net 001AAAAAB root".to_string()));
        let login = svc.sasl.take_resolved("001AAAAAB").unwrap();
        assert_eq!((login.account.as_str(), login.level), ("root", 5));
    }

    #[tokio::test]
    async fn wrong_password_fails_and_forgets() {
        let (svc, mut rx) = services(Dialect::Unrealircd).await;
        svc.db.admins().create("root", "hunter2", 5, None).await.unwrap();

        handle_frame(&svc, frame("001AAAAAB", 'S', "PLAIN", None)).await.unwrap();
        let payload = encode_plain("", "root", "nope");
        handle_frame(&svc, frame("001AAAAAB", 'C', &payload, None)).await.unwrap();

        let sent = drain(&mut rx);
        assert_eq!(sent.last().unwrap(), ":9SV SASL irc.example.net 001AAAAAB D F");
        assert!(svc.sasl.get("001AAAAAB").is_none());
        assert!(svc.sasl.take_resolved("001AAAAAB").is_none());

        // A replayed chunk finds no session and sends nothing.
        handle_frame(&svc, frame("001AAAAAB", 'C', &payload, None)).await.unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn external_waits_without_fingerprint() {
        let (svc, mut rx) = services(Dialect::Unrealircd).await;
        handle_frame(&svc, frame("001AAAAAB", 'S', "EXTERNAL", Some("+"))).await.unwrap();
        assert!(drain(&mut rx).is_empty());
        assert!(svc.sasl.get("001AAAAAB").unwrap().fingerprint.is_none());

        handle_frame(&svc, frame("001AAAAAC", 'S', "EXTERNAL", Some("ab:cd"))).await.unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![":9SV SASL irc.example.net 001AAAAAC C +".to_string()]
        );
    }

    #[tokio::test]
    async fn external_matches_stored_fingerprint() {
        let (svc, mut rx) = services(Dialect::Unrealircd).await;
        svc.db.admins().create("ops", "pw", 3, None).await.unwrap();
        svc.db.admins().set_fingerprint("ops", Some("AB:CD:EF")).await.unwrap();

        handle_frame(&svc, frame("001AAAAAB", 'S', "EXTERNAL", Some("abcdef"))).await.unwrap();
        handle_frame(&svc, frame("001AAAAAB", 'C', "+", None)).await.unwrap();
        assert!(drain(&mut rx).contains(&":9SV SASL irc.example.net 001AAAAAB D S".to_string()));
        assert_eq!(svc.sasl.take_resolved("001AAAAAB").unwrap().account, "ops");
    }

    #[tokio::test]
    async fn second_start_replaces_mechanism_and_abort_clears() {
        let (svc, mut rx) = services(Dialect::Unrealircd).await;
        handle_frame(&svc, frame("001AAAAAB", 'S', "EXTERNAL", None)).await.unwrap();
        handle_frame(&svc, frame("001AAAAAB", 'S', "PLAIN", None)).await.unwrap();
        assert_eq!(
            svc.sasl.get("001AAAAAB").unwrap().mechanism,
            Some(SaslMechanism::Plain)
        );
        handle_frame(&svc, frame("001AAAAAB", 'D', "A", None)).await.unwrap();
        assert!(svc.sasl.is_empty());
        drain(&mut rx);

        handle_frame(&svc, frame("001AAAAAC", 'S', "SCRAM-SHA-256", None)).await.unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![
                ":9SV SASL irc.example.net 001AAAAAC M PLAIN,EXTERNAL".to_string(),
                ":9SV SASL irc.example.net 001AAAAAC D F".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn chunked_payload_waits_for_short_frame() {
        let (svc, mut rx) = services(Dialect::Unrealircd).await;
        handle_frame(&svc, frame("001AAAAAB", 'S', "PLAIN", None)).await.unwrap();
        drain(&mut rx);

        let full = "A".repeat(SASL_CHUNK_SIZE);
        handle_frame(&svc, frame("001AAAAAB", 'C', &full, None)).await.unwrap();
        assert!(drain(&mut rx).is_empty());
        assert!(svc.sasl.get("001AAAAAB").is_some());

        handle_frame(&svc, frame("001AAAAAB", 'C', "+", None)).await.unwrap();
        assert!(svc.sasl.is_empty());
        assert_eq!(drain(&mut rx).last().unwrap(), ":9SV SASL irc.example.net 001AAAAAB D F");
    }
}
