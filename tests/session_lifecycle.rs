//! Integration tests for the link lifecycle over a real socket: handshake,
//! burst, restart and shutdown.

mod common;

use common::{FakeUplink, config_toml};
use common::uplink::UplinkConn;
use slsvcd::config::Config;
use slsvcd::error::SessionError;
use slsvcd::session::{self, Control, Services, SessionState};
use std::sync::Arc;
use tempfile::TempDir;

async fn start(uplink: &FakeUplink) -> (Arc<Services>, tokio::task::JoinHandle<Result<(), SessionError>>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("slsvcd.db");
    let path = dir.path().join("slsvcd.toml");
    std::fs::write(
        &path,
        config_toml("inspircd", uplink.port(), &db.display().to_string()),
    )
    .unwrap();
    let config = Config::load(&path).unwrap();
    let (svc, rx) = Services::new(config, Some(path)).await.unwrap();
    let handle = tokio::spawn(session::run(Arc::clone(&svc), rx));
    (svc, handle, dir)
}

/// Complete the handshake and both bursts.
async fn link(conn: &mut UplinkConn) {
    let hello = conn.recv_until(|l| l.starts_with("SERVER ")).await.unwrap();
    assert_eq!(hello[0], "CAPAB START 1205");
    assert_eq!(
        hello.last().unwrap(),
        "SERVER services.example.net linkpass 0 9SV :Network Services"
    );

    conn.send("CAPAB START 1205").await.unwrap();
    conn.send("CAPAB END").await.unwrap();
    conn.send("SERVER irc.example.net linkpass 0 001 :Example hub").await.unwrap();
    conn.recv_until(|l| l == ":9SV ENDBURST").await.unwrap();

    conn.send(":001 BURST 1700000000").await.unwrap();
    conn.send(":001 ENDBURST").await.unwrap();
    conn.recv_until(|l| l.starts_with(":9SV FJOIN #services "))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_link_and_shutdown() {
    let uplink = FakeUplink::bind().await.unwrap();
    let (svc, handle, _dir) = start(&uplink).await;
    let mut conn = uplink.accept().await.unwrap();
    link(&mut conn).await;
    assert_eq!(svc.phase(), SessionState::Synced);

    conn.send(":001 PING 001 9SV").await.unwrap();
    conn.recv_until(|l| l == ":9SV PONG 001").await.unwrap();

    conn.send(":001 UID 001AAAAAB 1700000000 alice h.example c.example alice 192.0.2.10 1700000000 +i :Alice")
        .await
        .unwrap();
    conn.send(":001 PING 001 9SV").await.unwrap();
    conn.recv_until(|l| l == ":9SV PONG 001").await.unwrap();
    assert!(svc.matrix.lock().users.exists("alice"));

    svc.request(Control::Shutdown("maintenance".into()));
    let tail = conn.recv_to_close().await.unwrap();
    assert!(tail.contains(&":9SVAAAAAA QUIT :maintenance".to_string()));
    assert_eq!(tail.last().unwrap(), ":9SV SQUIT 9SV :maintenance");

    handle.await.unwrap().unwrap();
    assert_eq!(svc.phase(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_restart_relinks_with_a_clean_view() {
    let uplink = FakeUplink::bind().await.unwrap();
    let (svc, handle, _dir) = start(&uplink).await;
    let mut conn = uplink.accept().await.unwrap();
    link(&mut conn).await;

    conn.send(":001 UID 001AAAAAB 1700000000 alice h.example c.example alice 192.0.2.10 1700000000 +i :Alice")
        .await
        .unwrap();
    conn.send(":001 PING 001 9SV").await.unwrap();
    conn.recv_until(|l| l == ":9SV PONG 001").await.unwrap();

    svc.request(Control::Restart("upgrade".into()));
    let tail = conn.recv_to_close().await.unwrap();
    assert_eq!(tail.last().unwrap(), ":9SV SQUIT 9SV :upgrade");

    let mut conn = uplink.accept().await.unwrap();
    let hello = conn.recv_until(|l| l.starts_with("SERVER ")).await.unwrap();
    assert_eq!(hello[0], "CAPAB START 1205");
    {
        let regs = svc.matrix.lock();
        assert!(!regs.users.exists("alice"));
        assert!(regs.servers.is_empty());
    }
    assert!(!svc.burst_complete());

    svc.request(Control::Shutdown("done".into()));
    conn.recv_to_close().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_uplink_error_ends_the_session() {
    let uplink = FakeUplink::bind().await.unwrap();
    let (_svc, handle, _dir) = start(&uplink).await;
    let mut conn = uplink.accept().await.unwrap();
    conn.recv_until(|l| l.starts_with("SERVER ")).await.unwrap();

    conn.send("ERROR :Closing link: bad credentials").await.unwrap();
    let result = handle.await.unwrap();
    assert!(matches!(result, Err(SessionError::LinkRejected(_))));
}

#[tokio::test]
async fn test_dropped_socket_ends_the_session() {
    let uplink = FakeUplink::bind().await.unwrap();
    let (_svc, handle, _dir) = start(&uplink).await;
    let mut conn = uplink.accept().await.unwrap();
    conn.recv_until(|l| l.starts_with("SERVER ")).await.unwrap();
    drop(conn);

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(SessionError::Closed)));
}
