//! Short, time-ordered identifiers for history rows.
//!
//! A compact ID is a base-36 string: a 4-character time-bucket prefix
//! followed by a random suffix. The default 7-character form gives
//! ~56 second buckets across a 3-year horizon and 36^3 random slots per
//! bucket. Collisions against a recently-seen set escalate to a
//! 9-character form and finally to a plain UUID.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Fixed epoch the time prefix counts from: 2024-01-01T00:00:00Z.
const ID_EPOCH_MS: i64 = 1_704_067_200_000;

/// Bucket width. 36^4 buckets * 56 s covers a little over three years.
const BUCKET_MS: i64 = 56_000;

const TIME_CHARS: usize = 4;
const SHORT_RANDOM_CHARS: usize = 3;
const LONG_RANDOM_CHARS: usize = 5;
const MAX_ATTEMPTS: usize = 10;

/// How many recently issued IDs are kept for collision detection.
const RECENT_CAPACITY: usize = 10_000;

struct RecentIds {
    set: HashSet<String>,
    order: VecDeque<String>,
}

impl RecentIds {
    fn new() -> Self {
        Self {
            set: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// Returns false if the ID was already present.
    fn insert(&mut self, id: &str) -> bool {
        if !self.set.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        while self.order.len() > RECENT_CAPACITY {
            if let Some(old) = self.order.pop_front() {
                self.set.remove(&old);
            }
        }
        true
    }
}

pub struct CompactIdGenerator {
    recent: Mutex<RecentIds>,
    rng: Mutex<StdRng>,
}

impl Default for CompactIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CompactIdGenerator {
    pub fn new() -> Self {
        Self {
            recent: Mutex::new(RecentIds::new()),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator used by tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            recent: Mutex::new(RecentIds::new()),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Record an externally assigned ID (e.g. a database-generated key) so
    /// later generations cannot collide with it.
    pub fn remember(&self, id: &str) {
        let mut recent = self.recent.lock().expect("recent id set poisoned");
        recent.insert(id);
    }

    pub fn generate(&self) -> String {
        self.generate_at(Utc::now().timestamp_millis())
    }

    /// Generate an ID for the given wall-clock instant.
    pub fn generate_at(&self, now_ms: i64) -> String {
        let prefix = time_prefix(now_ms);
        let mut recent = self.recent.lock().expect("recent id set poisoned");
        let mut rng = self.rng.lock().expect("id rng poisoned");

        for attempt in 0..MAX_ATTEMPTS {
            // Every attempt draws the long suffix so the stream stays
            // aligned regardless of which variant is emitted.
            let drawn: String = (0..LONG_RANDOM_CHARS)
                .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
                .collect();
            let suffix_len = if attempt < MAX_ATTEMPTS / 2 {
                SHORT_RANDOM_CHARS
            } else {
                LONG_RANDOM_CHARS
            };
            let candidate = format!("{prefix}{}", &drawn[..suffix_len]);
            if recent.insert(&candidate) {
                return candidate;
            }
        }

        // Last resort: a UUID cannot collide with the compact space.
        let fallback = Uuid::new_v4().to_string();
        recent.insert(&fallback);
        fallback
    }
}

fn time_prefix(now_ms: i64) -> String {
    let bucket =
        ((now_ms - ID_EPOCH_MS).div_euclid(BUCKET_MS)).rem_euclid(36_i64.pow(TIME_CHARS as u32));
    encode_base36(bucket as u64, TIME_CHARS)
}

fn encode_base36(mut value: u64, width: usize) -> String {
    let mut out = vec![b'0'; width];
    for slot in out.iter_mut().rev() {
        *slot = ALPHABET[(value % 36) as usize];
        value /= 36;
    }
    String::from_utf8(out).expect("alphabet is ascii")
}

/// Recover the generation instant from a compact ID, to bucket precision.
/// Returns `None` for IDs that are not in the compact format (UUIDs,
/// database-assigned keys).
pub fn extract_timestamp_ms(id: &str) -> Option<i64> {
    if id.len() != TIME_CHARS + SHORT_RANDOM_CHARS && id.len() != TIME_CHARS + LONG_RANDOM_CHARS {
        return None;
    }
    let mut bucket: i64 = 0;
    for byte in id.bytes().take(TIME_CHARS) {
        let digit = ALPHABET.iter().position(|c| *c == byte)? as i64;
        bucket = bucket * 36 + digit;
    }
    Some(ID_EPOCH_MS + bucket * BUCKET_MS)
}
