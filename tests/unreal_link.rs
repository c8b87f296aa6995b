//! Integration tests for the UnrealIRCd 6 dialect.

mod common;

use common::Harness;
use slsvcd::protocol::BanClass;

#[tokio::test]
async fn test_handshake_and_burst() {
    let mut h = Harness::new("unrealircd").await.unwrap();
    h.feed_all(&[
        "PASS :linkpass",
        "PROTOCTL EAUTH=irc.example.net,6100 SID=001",
        "SERVER irc.example.net 1 :U6100-Fhin6XeOoE-001 Example hub",
    ])
    .await
    .unwrap();

    let link = h.svc.link.lock().clone();
    assert_eq!(link.uplink_sid.as_deref(), Some("001"));
    assert_eq!(link.uplink_name.as_deref(), Some("irc.example.net"));
    assert_eq!(link.protocol_version, Some(6100));

    let burst = h.sent();
    assert!(burst[0].starts_with(":9SV UID Svc 1 "), "got {burst:?}");
    assert!(burst.iter().any(|l| l.starts_with(":9SV SJOIN ") && l.ends_with("#services :9SVAAAAAA")));
    assert!(burst.contains(&":9SV MD client services.example.net saslmechlist :PLAIN,EXTERNAL".to_string()));
    assert_eq!(burst.last().map(String::as_str), Some(":9SV EOS"));
    assert!(h.svc.matrix.lock().channels.is_member("#services", "9SVAAAAAA"));
}

#[tokio::test]
async fn test_wrong_pass_is_fatal() {
    let h = Harness::new("unrealircd").await.unwrap();
    assert!(h.feed("PASS :nope").await.is_err());
}

#[tokio::test]
async fn test_uid_with_tags_and_reputation() {
    let mut h = Harness::new("unrealircd").await.unwrap();
    h.link_unreal().await.unwrap();

    h.feed(":001 REPUTATION 192.0.2.10 42").await.unwrap();
    h.feed("@s2s-md/geoip=cc=NL|cd=Netherlands;s2s-md/certfp=ab12;s2s-md/webirc=1 :001 UID alice 0 1700000000 alice host.example.org 001AAAAAB 0 +iw * cloak.example.org wAACCg== :Alice Liddell")
        .await
        .unwrap();

    let regs = h.svc.matrix.lock();
    let alice = regs.users.get("001AAAAAB").unwrap();
    assert_eq!(alice.nick, "alice");
    assert_eq!(alice.ip, "192.0.2.10");
    assert_eq!(alice.vhost, "cloak.example.org");
    assert_eq!(alice.realname, "Alice Liddell");
    assert_eq!(alice.country.as_deref(), Some("NL"));
    assert_eq!(alice.fingerprint.as_deref(), Some("ab12"));
    assert_eq!(alice.reputation, 42);
    assert!(alice.webirc);
    assert!(!alice.websocket);
    assert!(alice.account.is_none());
}

#[tokio::test]
async fn test_user_updates() {
    let mut h = Harness::new("unrealircd").await.unwrap();
    h.link_unreal().await.unwrap();
    h.feed(":001 UID bob 0 1700000000 bob host.example.org 001AAAAAC 0 +i * * wAACCg== :Bob")
        .await
        .unwrap();

    h.feed(":001AAAAAC UMODE2 +x").await.unwrap();
    h.feed(":001 SVS2MODE 001AAAAAC -i").await.unwrap();
    h.feed(":001AAAAAC SETHOST bob.users.example").await.unwrap();
    h.feed(":001 MD client 001AAAAAC certfp :AABBCC").await.unwrap();
    h.feed(":001AAAAAC NICK robert 1700000050").await.unwrap();

    let regs = h.svc.matrix.lock();
    let bob = regs.users.get("robert").unwrap();
    assert_eq!(bob.modes, "x");
    assert_eq!(bob.vhost, "bob.users.example");
    assert_eq!(bob.fingerprint.as_deref(), Some("aabbcc"));
}

#[tokio::test]
async fn test_sjoin_and_part() {
    let mut h = Harness::new("unrealircd").await.unwrap();
    h.link_unreal().await.unwrap();
    h.feed(":001 UID bob 0 1700000000 bob h.example 001AAAAAC 0 +i * * wAACCg== :Bob")
        .await
        .unwrap();
    h.feed(":001 SJOIN 1700000000 #chat +nt :@001AAAAAC &*!*@bad.example")
        .await
        .unwrap();
    assert!(h.svc.matrix.lock().channels.is_member("#chat", "001AAAAAC"));

    h.feed(":001AAAAAC PART #chat :bye").await.unwrap();
    assert!(!h.svc.matrix.lock().channels.exists("#chat"));
}

#[tokio::test]
async fn test_downstream_eos_is_ignored() {
    let mut h = Harness::new("unrealircd").await.unwrap();
    h.feed_all(&[
        "PASS :linkpass",
        "PROTOCTL SID=001",
        "SERVER irc.example.net 1 :U6100-Fhin6XeOoE-001 Example hub",
        ":001 SID leaf.example.net 2 002 :Leaf",
        ":002 EOS",
    ])
    .await
    .unwrap();
    assert!(!h.svc.burst_complete());
    assert!(h.svc.matrix.lock().servers.exists("002"));

    h.feed(":001 EOS").await.unwrap();
    assert!(h.svc.burst_complete());
    // The log channel was joined in our burst, not again at end of burst.
    let rejoins = h
        .sent()
        .into_iter()
        .filter(|l| l.contains("SJOIN") && l.contains("#services"))
        .count();
    assert_eq!(rejoins, 1);
}

#[tokio::test]
async fn test_killed_service_is_reintroduced() {
    let mut h = Harness::new("unrealircd").await.unwrap();
    h.link_unreal().await.unwrap();
    h.feed(":001 UID oper 0 1700000000 oper h.example 001AAAAAD 0 +io * * wAACCg== :Oper")
        .await
        .unwrap();
    h.feed(":001AAAAAD KILL 9SVAAAAAA :testing").await.unwrap();

    let sent = h.sent();
    assert!(sent.iter().any(|l| l.starts_with(":9SV UID Svc ")));
    assert!(sent.iter().any(|l| l.contains("SJOIN") && l.contains("#services")));
    assert!(h.svc.matrix.lock().users.exists("Svc"));
}

#[tokio::test]
async fn test_ban_lines() {
    let mut h = Harness::new("unrealircd").await.unwrap();
    h.link_unreal().await.unwrap();
    h.svc.ban_add(BanClass::KLine, "*", "bad.example", 3600, "Go away");
    h.svc.ban_add(BanClass::GLine, "*", "worse.example", 0, "Really");
    h.svc.ban_remove(BanClass::GLine, "*", "worse.example");

    let sent = h.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent[0].contains("TKL + k * bad.example"));
    assert!(sent[1].contains("TKL + G * worse.example"));
    assert!(sent[2].contains("TKL - G * worse.example"));
}
