use std::path::Path;

use sha2::{Digest, Sha256};

const MAX_KEY_LEN: usize = 96;
const DIGEST_LEN: usize = 8;

/// File-name-safe key for a repository directory, e.g.
/// `/home/me/src/My App` -> `home-me-src-my_app-1f3a09c2`.
///
/// The readable part maps separators to `-` and anything outside
/// `[a-z0-9_.-]` to `_`. That mapping is lossy, so a short digest of the
/// full path keeps `/a b` and `/a_b` apart. Long keys keep the tail of the
/// readable part, which is the most specific.
pub fn repo_key(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let digest = hex::encode(Sha256::digest(raw.as_bytes()));

    let readable = readable_part(&raw);
    let room = MAX_KEY_LEN - DIGEST_LEN - 1;
    let readable = if readable.len() <= room {
        readable.as_str()
    } else {
        readable[readable.len() - room..].trim_start_matches(['-', '_', '.'])
    };
    format!("{readable}-{}", &digest[..DIGEST_LEN])
}

fn readable_part(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let lower = match lower.as_bytes() {
        [drive, b':', ..] if drive.is_ascii_alphabetic() => {
            format!("{}/{}", *drive as char, &lower[2..])
        }
        _ => lower,
    };

    let mut key = String::with_capacity(lower.len());
    for c in lower.chars() {
        let mapped = match c {
            '/' | '\\' => '-',
            c if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') => c,
            _ => '_',
        };
        let repeated = matches!(mapped, '-' | '_') && key.ends_with(mapped);
        if !repeated {
            key.push(mapped);
        }
    }

    let key = key.trim_matches(['-', '_', '.']);
    if key.is_empty() {
        "default".to_string()
    } else {
        key.to_string()
    }
}
