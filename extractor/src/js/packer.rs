use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::*;

use super::escape;

static SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"eval\(\s*function\s*\(\s*p\s*,\s*a\s*,\s*c\s*,\s*k\s*,\s*e\s*,\s*(?:d|r)\s*\)")
        .unwrap()
});

static ARGUMENTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"(?s)\}\s*\(\s*(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")"#,
        r"\s*,\s*(\d+|\[\])\s*,\s*(\d+)\s*,\s*",
        r#"(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")"#,
        r#"\.split\(\s*['"]([^'"]*)['"]\s*\)"#,
    ))
    .unwrap()
});

/// ASCII words only, as the packer's own `\b\w+\b` sees them.
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?-u:\b\w+\b)").unwrap());

const DIGITS: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Arguments of an `eval(function(p,a,c,k,e,d){...}(...))` packed script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedScript {
    pub payload: String,
    pub radix: u32,
    pub word_count: usize,
    pub dictionary: Vec<String>,
}

impl PackedScript {
    pub fn parse(source: &str) -> Option<PackedScript> {
        let start = SIGNATURE.find(source)?.start();
        let caps = ARGUMENTS.captures(&source[start..])?;
        let payload = literal(&caps, 1, 2)?;
        let radix = match &caps[3] {
            "[]" => 62,
            digits => digits.parse().ok()?,
        };
        let word_count = caps[4].parse().ok()?;
        let words = literal(&caps, 5, 6)?;
        let dictionary = words.split(&caps[7]).map(str::to_owned).collect();
        Some(PackedScript {
            payload,
            radix,
            word_count,
            dictionary,
        })
    }

    pub fn unpack(&self) -> Option<String> {
        if !(2..=62).contains(&self.radix) {
            warn!("Unsupported packer radix {}", self.radix);
            return None;
        }
        if self.dictionary.len() != self.word_count {
            warn!(
                "Packer dictionary has {} words, expected {}",
                self.dictionary.len(),
                self.word_count
            );
            return None;
        }
        let unpacked = WORD.replace_all(&self.payload, |caps: &Captures| {
            let token = &caps[0];
            match unbase(token, self.radix).and_then(|i| self.dictionary.get(i)) {
                Some(word) if !word.is_empty() => word.clone(),
                _ => token.to_owned(),
            }
        });
        Some(unpacked.into_owned())
    }
}

fn literal(caps: &Captures, single: usize, double: usize) -> Option<String> {
    if let Some(m) = caps.get(single) {
        Some(escape::decode(m.as_str(), '\''))
    } else {
        caps.get(double).map(|m| escape::decode(m.as_str(), '"'))
    }
}

fn unbase(token: &str, radix: u32) -> Option<usize> {
    let radix = radix as usize;
    let mut value: usize = 0;
    for ch in token.chars() {
        let ch = if radix <= 36 {
            ch.to_ascii_lowercase()
        } else {
            ch
        };
        let digit = DIGITS.find(ch).filter(|d| *d < radix)?;
        value = value.checked_mul(radix)?.checked_add(digit)?;
    }
    Some(value)
}

pub fn detect(source: &str) -> bool {
    SIGNATURE.is_match(source)
}

/// Unpacks the first packed script found in `source`.
pub fn unpack(source: &str) -> Option<String> {
    PackedScript::parse(source)?.unpack()
}

/// Every packed script of a page, in page order. Broken ones are skipped.
pub fn unpack_all(source: &str) -> Vec<String> {
    SIGNATURE
        .find_iter(source)
        .filter_map(|m| PackedScript::parse(&source[m.start()..])?.unpack())
        .collect()
}
