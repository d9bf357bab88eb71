use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::*;

use crate::js::escape;

static CIPHER_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"\bm\s*=\s*t\(\s*(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")\s*,\s*"#,
        r#"(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")\s*\)"#,
    ))
    .unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherPayload {
    pub cipher_text: String,
    pub key: String,
}

impl CipherPayload {
    pub fn new(cipher_text: impl Into<String>, key: impl Into<String>) -> Self {
        CipherPayload {
            cipher_text: cipher_text.into(),
            key: key.into(),
        }
    }

    /// Plain alphabet, the first `len / 2` chars of the key.
    pub fn key_first_half(&self) -> Vec<char> {
        let key: Vec<char> = self.key.chars().collect();
        key[..key.len() / 2].to_vec()
    }

    /// Cipher alphabet, everything after the first half.
    pub fn key_second_half(&self) -> Vec<char> {
        let key: Vec<char> = self.key.chars().collect();
        key[key.len() / 2..].to_vec()
    }

    pub fn plain_text(&self) -> String {
        let plain = self.key_first_half();
        let cipher = self.key_second_half();
        self.cipher_text
            .chars()
            .map(|ch| {
                cipher
                    .iter()
                    .position(|c| *c == ch)
                    .and_then(|i| plain.get(i))
                    .copied()
                    .unwrap_or(ch)
            })
            .collect()
    }

    pub fn decrypt(&self) -> Option<Value> {
        match serde_json::from_str(&self.plain_text()) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("Decrypted config is not json: {e}");
                None
            }
        }
    }
}

pub fn decrypt(cipher_text: &str, key: &str) -> Option<Value> {
    CipherPayload::new(cipher_text, key).decrypt()
}

/// Finds the `m=t('<payload>','<key>')` call, both literals unescaped.
pub fn find_cipher_payload(html: &str) -> Option<CipherPayload> {
    let caps = CIPHER_CALL.captures(html)?;
    let literal = |single: usize, double: usize| {
        caps.get(single)
            .map(|m| escape::decode(m.as_str(), '\''))
            .or_else(|| caps.get(double).map(|m| escape::decode(m.as_str(), '"')))
    };
    Some(CipherPayload::new(literal(1, 2)?, literal(3, 4)?))
}

#[cfg(test)]
pub(crate) fn encrypt(plain_text: &str, key: &str) -> String {
    let payload = CipherPayload::new("", key);
    let plain = payload.key_first_half();
    let cipher = payload.key_second_half();
    plain_text
        .chars()
        .map(|ch| {
            plain
                .iter()
                .position(|c| *c == ch)
                .and_then(|i| cipher.get(i))
                .copied()
                .unwrap_or(ch)
        })
        .collect()
}
