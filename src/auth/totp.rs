//! Time-based one-time passwords (RFC 6238) and recovery codes.
//!
//! Secrets are 20 random bytes shown to the user as unpadded RFC 4648 base32,
//! which is what authenticator apps expect in `otpauth://` URLs.

use hmac::{Hmac, Mac};
use rand::{distributions::Alphanumeric, Rng, RngCore};
use sha1::Sha1;
use sha2::{Digest, Sha256};

type HmacSha1 = Hmac<Sha1>;

const STEP_SECONDS: u64 = 30;
const DIGITS: u32 = 6;
/// Codes from one step either side of "now" are accepted to absorb clock drift.
const ALLOWED_SKEW: i64 = 1;
const SECRET_BYTES: usize = 20;
const BACKUP_CODE_COUNT: usize = 8;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

pub fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            let index = (buffer >> (bits - 5)) & 0x1f;
            out.push(BASE32_ALPHABET[index as usize] as char);
            bits -= 5;
        }
    }
    if bits > 0 {
        let index = (buffer << (5 - bits)) & 0x1f;
        out.push(BASE32_ALPHABET[index as usize] as char);
    }
    out
}

/// Decodes base32, ignoring case, spaces and `=` padding. Returns `None` on invalid characters.
pub fn base32_decode(input: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for c in input.chars().filter(|c| !c.is_whitespace() && *c != '=') {
        let upper = c.to_ascii_uppercase() as u8;
        let value = BASE32_ALPHABET.iter().position(|&a| a == upper)? as u32;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            out.push((buffer >> (bits - 8)) as u8);
            bits -= 8;
        }
    }
    Some(out)
}

/// Generates a new random secret, base32 encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    base32_encode(&bytes)
}

/// HOTP value (RFC 4226) for `counter`.
fn hotp(key: &[u8], counter: u64) -> Option<u32> {
    let mut mac = HmacSha1::new_from_slice(key).ok()?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = (u32::from(digest[offset] & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);
    Some(binary % 10u32.pow(DIGITS))
}

/// The code valid at `unix_time` for a base32 `secret`.
pub fn code_at(secret: &str, unix_time: u64) -> Option<String> {
    let key = base32_decode(secret)?;
    let value = hotp(&key, unix_time / STEP_SECONDS)?;
    Some(format!("{:0width$}", value, width = DIGITS as usize))
}

/// Checks `code` against the steps around `unix_time`.
pub fn verify(secret: &str, code: &str, unix_time: u64) -> bool {
    let code = code.trim();
    if code.len() != DIGITS as usize || !code.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let Some(key) = base32_decode(secret) else {
        return false;
    };
    let step = (unix_time / STEP_SECONDS) as i64;
    (-ALLOWED_SKEW..=ALLOWED_SKEW).any(|offset| {
        let counter = step + offset;
        counter >= 0
            && hotp(&key, counter as u64)
                .map(|value| format!("{:0width$}", value, width = DIGITS as usize) == code)
                .unwrap_or(false)
    })
}

pub fn verify_now(secret: &str, code: &str) -> bool {
    verify(secret, code, chrono::Utc::now().timestamp().max(0) as u64)
}

/// `otpauth://` URL for QR codes.
pub fn otpauth_url(issuer: &str, account: &str, secret: &str) -> String {
    let label = format!("{}:{}", issuer, account);
    format!(
        "otpauth://totp/{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
        url_encode(&label),
        secret,
        url_encode(issuer),
        DIGITS,
        STEP_SECONDS
    )
}

fn url_encode(input: &str) -> String {
    url::form_urlencoded::byte_serialize(input.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Generates recovery codes formatted `xxxx-xxxx`.
pub fn generate_backup_codes() -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..BACKUP_CODE_COUNT)
        .map(|_| {
            let raw: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(8)
                .map(|c| (c as char).to_ascii_lowercase())
                .collect();
            format!("{}-{}", &raw[..4], &raw[4..])
        })
        .collect()
}

/// Recovery codes are stored as SHA-256 hex of their normalized form.
pub fn hash_backup_code(code: &str) -> String {
    let normalized: String = code
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect();
    hex::encode(Sha256::digest(normalized.as_bytes()))
}
