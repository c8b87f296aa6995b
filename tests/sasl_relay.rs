//! Integration tests for SASL relayed by the uplink.

mod common;

use common::Harness;

#[tokio::test]
async fn test_unreal_plain_login_before_uid() {
    let mut h = Harness::new("unrealircd").await.unwrap();
    h.link_unreal().await.unwrap();
    h.svc.db.admins().create("root", "s3cret", 5, None).await.unwrap();

    h.feed(":irc.example.net SASL services.example.net 001AAAAAB H host.example.org 192.0.2.10")
        .await
        .unwrap();
    h.feed(":irc.example.net SASL services.example.net 001AAAAAB S PLAIN")
        .await
        .unwrap();
    assert_eq!(
        h.sent(),
        vec![":9SV SASL irc.example.net 001AAAAAB C +".to_string()]
    );

    h.feed(":irc.example.net SASL services.example.net 001AAAAAB C cm9vdAByb290AHMzY3JldA==")
        .await
        .unwrap();
    let sent = h.sent();
    assert!(sent.contains(&":9SV SVSLOGIN irc.example.net 001AAAAAB root".to_string()));
    assert!(sent.contains(&":9SV SASL irc.example.net 001AAAAAB D S".to_string()));

    // The session is bound once the user is introduced.
    h.feed(":001 UID alice 0 1700000000 alice host.example.org 001AAAAAB root +i * * wAACCg== :Alice")
        .await
        .unwrap();
    let admin = h.svc.matrix.lock().admins.get("alice").cloned().unwrap();
    assert_eq!(admin.account, "root");
    assert_eq!(admin.level, 5);

    let audit = h.svc.db.logs().recent_audit(10).await.unwrap();
    assert!(audit.iter().any(|e| e.action == "auth.sasl"));
}

#[tokio::test]
async fn test_frames_for_other_servers_are_ignored() {
    let mut h = Harness::new("unrealircd").await.unwrap();
    h.link_unreal().await.unwrap();
    h.feed(":irc.example.net SASL other.example.net 001AAAAAB S PLAIN")
        .await
        .unwrap();
    assert!(h.sent().is_empty());
    assert!(h.svc.sasl.is_empty());
}

#[tokio::test]
async fn test_inspircd_encap_wrong_password() {
    let mut h = Harness::new("inspircd").await.unwrap();
    h.link_inspircd().await.unwrap();
    h.svc.db.admins().create("oper", "right", 3, None).await.unwrap();

    h.feed(":001 ENCAP 9SV SASL 001AAAAAB * S PLAIN").await.unwrap();
    assert_eq!(
        h.sent(),
        vec![":9SV ENCAP 001 SASL 9SVAAAAAA 001AAAAAB C +".to_string()]
    );

    h.feed(":001 ENCAP 9SV SASL 001AAAAAB * C b3BlcgBvcGVyAHdyb25n")
        .await
        .unwrap();
    assert_eq!(
        h.sent(),
        vec![":9SV ENCAP 001 SASL 9SVAAAAAA 001AAAAAB D F".to_string()]
    );
    assert!(h.svc.sasl.is_empty());
    assert!(h.svc.sasl.take_resolved("001AAAAAB").is_none());
}

#[tokio::test]
async fn test_quit_drops_pending_session() {
    let mut h = Harness::new("inspircd").await.unwrap();
    h.link_inspircd().await.unwrap();
    h.insp_user("001AAAAAB", "alice").await.unwrap();
    h.feed(":001 ENCAP * SASL 001AAAAAB * S PLAIN").await.unwrap();
    assert_eq!(h.svc.sasl.len(), 1);

    h.feed(":001AAAAAB QUIT :bye").await.unwrap();
    assert!(h.svc.sasl.is_empty());
}
