//! UID generation for locally introduced pseudo-users.

use std::sync::atomic::{AtomicU64, Ordering};

/// Generates UIDs in TS6 format: SID (3 chars) + 6 base36 chars.
///
/// Suffix `AAAAAA` belongs to the service pseudo-client; generated UIDs
/// start after it.
#[derive(Debug)]
pub struct UidGenerator {
    sid: String,
    counter: AtomicU64,
}

impl UidGenerator {
    pub fn new(sid: &str) -> Self {
        Self {
            sid: sid.to_string(),
            counter: AtomicU64::new(1),
        }
    }

    /// UID of the service pseudo-client.
    pub fn service_uid(&self) -> String {
        format!("{}{}", self.sid, base36_encode_6(0))
    }

    /// Generate the next UID.
    pub fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.sid, base36_encode_6(n))
    }
}

fn base36_encode_6(mut n: u64) -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut result = [b'A'; 6];

    for slot in result.iter_mut().rev() {
        *slot = CHARS[(n % 36) as usize];
        n /= 36;
    }

    result.iter().map(|&b| b as char).collect()
}
