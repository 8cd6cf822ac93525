//! Human-readable document numbers for orders and receipts.
//!
//! Numbers look like `PO-20240301093000-7K2Q`: prefix, UTC timestamp to the
//! second, four random base36 characters. Uniqueness is enforced by the
//! repositories; generators only have to make collisions unlikely.

use chrono::{DateTime, Utc};
use rand::Rng;

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SUFFIX_LEN: usize = 4;

#[cfg_attr(test, mockall::automock)]
pub trait NumberGenerator: Send + Sync {
    fn next_number(&self, prefix: &str, now: DateTime<Utc>) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampNumberGenerator;

impl NumberGenerator for TimestampNumberGenerator {
    fn next_number(&self, prefix: &str, now: DateTime<Utc>) -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect();
        format!("{}-{}-{}", prefix, now.format("%Y%m%d%H%M%S"), suffix)
    }
}
