use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

pub const KEY_PREFIX: &str = "dk_";
const RANDOM_LENGTH: usize = 40;
/// Number of leading characters kept in clear so users can tell keys apart.
const DISPLAY_PREFIX_LENGTH: usize = 11;

/// A freshly generated key. `plaintext` is shown to the user exactly once.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub plaintext: String,
    pub prefix: String,
    pub hash: String,
}

pub fn generate() -> GeneratedKey {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_LENGTH)
        .map(char::from)
        .collect();
    let plaintext = format!("{}{}", KEY_PREFIX, random);
    GeneratedKey {
        prefix: plaintext[..DISPLAY_PREFIX_LENGTH].to_string(),
        hash: hash(&plaintext),
        plaintext,
    }
}

/// SHA-256 hex digest; the only form in which keys are stored.
pub fn hash(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Distinguishes API keys from JWTs in an `Authorization: Bearer` header.
pub fn looks_like_key(token: &str) -> bool {
    token.starts_with(KEY_PREFIX)
        && token.len() == KEY_PREFIX.len() + RANDOM_LENGTH
        && token[KEY_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric())
}
