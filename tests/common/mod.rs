//! Integration test common infrastructure.
//!
//! Provides an in-process services harness fed raw uplink lines, and a
//! fake uplink the daemon can connect to over TCP.

pub mod harness;
pub mod uplink;

#[allow(unused_imports)]
pub use harness::Harness;
#[allow(unused_imports)]
pub use uplink::FakeUplink;

/// Link password every test configuration uses.
pub const LINK_PASSWORD: &str = "linkpass";

/// A complete configuration file for `dialect` pointing at `port`.
pub fn config_toml(dialect: &str, port: u16, database: &str) -> String {
    format!(
        r##"
[uplink]
name = "services.example.net"
sid = "9SV"
host = "127.0.0.1"
port = {port}
password = "{LINK_PASSWORD}"
dialect = "{dialect}"

[service]
nick = "Svc"
host = "services.example.net"
log_channel = "#services"
banner = false

[database]
path = "{database}"

[heartbeat]
interval_secs = 1

[owner]
name = "root"
password = "bootstrap"
"##
    )
}
