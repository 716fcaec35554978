//! Every key produced here is a valid store path segment: no `.`, `#`, `$`,
//! `[`, `]` or `/`.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

const FORBIDDEN_SEGMENT_CHARS: [char; 6] = ['.', '#', '$', '[', ']', '/'];
const MAX_SEGMENT_BYTES: usize = 768;

static PUSH_SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// ISO-8601 with millisecond precision, e.g. `2024-12-24T18:30:00.000Z`.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_iso() -> String {
    iso_timestamp(Utc::now())
}

/// Sortable notification key derived from `at`, with a random tail so two
/// keys minted in the same millisecond do not collide.
pub fn timestamp_key(at: DateTime<Utc>) -> String {
    let safe = iso_timestamp(at).replace('.', "_").replace([':', '/'], "-");
    let tail = Uuid::new_v4().simple().to_string();
    format!("{safe}_{}", &tail[..8])
}

/// Key for append-with-generated-key. Lexicographic order follows creation order
/// within one process.
pub fn push_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let seq = PUSH_SEQUENCE.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;
    let tail = Uuid::new_v4().simple().to_string();
    format!("{millis:012x}{seq:06x}{}", &tail[..8])
}

pub fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment.len() <= MAX_SEGMENT_BYTES
        && !segment
            .chars()
            .any(|c| c.is_control() || FORBIDDEN_SEGMENT_CHARS.contains(&c))
}
