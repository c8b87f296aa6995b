//! Isolated services objects for unit tests.

use super::{Receivers, Services};
use crate::config::{Config, Dialect, SAMPLE};
use crate::db::Database;
use std::sync::Arc;

pub(crate) fn config(dialect: Dialect) -> Config {
    let mut config = Config::parse(SAMPLE).unwrap();
    config.uplink.dialect = dialect;
    config.service.umodes = "+ioS".into();
    config.service.banner = false;
    config.database.path = ":memory:".into();
    config
}

/// Services with an in-memory database and nothing linked.
pub(crate) async fn services(dialect: Dialect) -> (Arc<Services>, Receivers) {
    let db = Database::new(":memory:").await.unwrap();
    Services::with_database(config(dialect), None, db)
}

/// Everything queued for the uplink so far.
pub(crate) fn drain(rx: &mut Receivers) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(line) = rx.outbound.try_recv() {
        lines.push(line);
    }
    lines
}
