use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::models::MediaType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub score: i32,
    /// Key of the pattern that produced the url.
    pub source_pattern: &'static str,
}

impl Candidate {
    pub fn media_type(&self) -> MediaType {
        MediaType::from_url(&self.url)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Scoring {
    /// Progressive files first, explicit download links next, manifests last.
    Heuristic,
    /// Everything scores 0, the first match wins.
    Flat,
}

struct KeyPattern {
    key: &'static str,
    regex: Regex,
}

fn key_pattern(key: &'static str, regex: &str) -> KeyPattern {
    KeyPattern {
        key,
        regex: Regex::new(regex).unwrap(),
    }
}

static MEDIA_KEYS: Lazy<Vec<KeyPattern>> = Lazy::new(|| {
    vec![
        key_pattern("download", r#"\bdownload["']?\s*:\s*["']([^"']+)["']"#),
        key_pattern("file", r#"\bfile["']?\s*:\s*["']([^"']+)["']"#),
        key_pattern("src", r#"\bsrc["']?\s*:\s*["']([^"']+)["']"#),
        key_pattern(
            "sources",
            r#"\bsources["']?\s*:\s*\[\s*(?:\{[^}]*?\bfile["']?\s*:\s*)?["']([^"']+)["']"#,
        ),
    ]
});

static HLS_KEYS: Lazy<Vec<KeyPattern>> = Lazy::new(|| {
    vec![
        key_pattern("source", r#"\bsource["']?\s*:\s*["']([^"']+)["']"#),
        key_pattern("hls", r#"\bhls["']?\s*:\s*["']([^"']+)["']"#),
        key_pattern(
            "m3u8",
            r#"["']((?:https?:)?//[^"'\s]+?\.m3u8[^"'\s]*)["']"#,
        ),
    ]
});

/// Collects media url candidates out of html or unpacked javascript.
pub struct Scanner {
    patterns: Vec<&'static KeyPattern>,
    scoring: Scoring,
}

impl Scanner {
    /// `download`, `file`, `src` and `sources` keys.
    pub fn media() -> Scanner {
        Scanner {
            patterns: MEDIA_KEYS.iter().collect(),
            scoring: Scoring::Heuristic,
        }
    }

    /// The media keys plus `source`, `hls` and bare quoted `.m3u8` urls.
    pub fn hls() -> Scanner {
        Scanner {
            patterns: MEDIA_KEYS.iter().chain(HLS_KEYS.iter()).collect(),
            scoring: Scoring::Heuristic,
        }
    }

    pub fn with_scoring(mut self, scoring: Scoring) -> Scanner {
        self.scoring = scoring;
        self
    }

    pub fn scan(&self, text: &str) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = Vec::new();
        for pattern in &self.patterns {
            for caps in pattern.regex.captures_iter(text) {
                let Some(url) = absolute_url(&caps[1]) else {
                    continue;
                };
                if candidates.iter().any(|c| c.url == url) {
                    continue;
                }
                let score = match self.scoring {
                    Scoring::Heuristic => score(&url, pattern.key),
                    Scoring::Flat => 0,
                };
                candidates.push(Candidate {
                    url,
                    score,
                    source_pattern: pattern.key,
                });
            }
        }
        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        candidates
    }

    pub fn best(&self, text: &str) -> Option<Candidate> {
        self.scan(text).into_iter().next()
    }
}

fn absolute_url(raw: &str) -> Option<String> {
    let url = raw.trim().replace("\\/", "/");
    let url = match url.strip_prefix("//") {
        Some(rest) if !rest.is_empty() => format!("https://{rest}"),
        Some(_) => return None,
        None => url,
    };
    let parsed = Url::parse(&url).ok()?;
    (matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some()).then_some(url)
}

fn score(url: &str, key: &str) -> i32 {
    let path = Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_default();
    let mut score = 0;
    if path.ends_with(".mp4") || path.ends_with(".mkv") {
        score += 10;
    }
    if key.contains("download") {
        score += 5;
    }
    if path.ends_with(".m3u8") {
        score -= 5;
    }
    score
}

#[cfg(test)]
mod test {
    use super::{Scanner, Scoring};
    use crate::models::MediaType;

    #[test]
    fn test_progressive_ranks_first() {
        let html = r#"player.setup({file:"https://x/b.m3u8"}); var alt = {file:"https://x/a.mp4"};"#;
        let candidates = Scanner::media().scan(html);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].url, "https://x/a.mp4");
        assert_eq!(candidates[0].score, 10);
        assert_eq!(candidates[1].url, "https://x/b.m3u8");
        assert_eq!(candidates[1].score, -5);
        assert_eq!(candidates[1].media_type(), MediaType::Hls);
    }

    #[test]
    fn test_download_bonus_and_ties() {
        let html = r#"{download:"https://x/get?id=1", file:"https://x/stream", src:"https://x/other"}"#;
        let candidates = Scanner::media().scan(html);
        let urls: Vec<_> = candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, ["https://x/get?id=1", "https://x/stream", "https://x/other"]);
        assert_eq!(candidates[0].score, 5);
        assert_eq!(candidates[0].source_pattern, "download");
    }

    #[test]
    fn test_flat_scoring_keeps_first() {
        let html = r#"sources: ["https://cdn.x/hls/master.m3u8"], 'hls': 'https://cdn.x/alt.m3u8', src: "https://cdn.x/v.mp4""#;
        let best = Scanner::hls().with_scoring(Scoring::Flat).best(html).unwrap();
        assert_eq!(best.url, "https://cdn.x/v.mp4");
        assert_eq!(best.score, 0);

        let candidates = Scanner::hls().with_scoring(Scoring::Flat).scan(html);
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[1].source_pattern, "sources");
        assert_eq!(candidates[2].source_pattern, "hls");
    }

    #[test]
    fn test_relative_and_duplicates() {
        let html = r#"file:"/dl?b=slides", src:'//cdn.x/v.m3u8', "https:\/\/cdn.x\/v.m3u8", source: "blob:https://x/1""#;
        let candidates = Scanner::hls().scan(html);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].url, "https://cdn.x/v.m3u8");
        assert_eq!(candidates[0].source_pattern, "src");
    }

    #[test]
    fn test_bare_manifest() {
        let html = r#"<script>var u = "https://cdn.x/live/index.m3u8?token=abc";</script>"#;
        assert!(Scanner::media().best(html).is_none());
        let best = Scanner::hls().best(html).unwrap();
        assert_eq!(best.url, "https://cdn.x/live/index.m3u8?token=abc");
        assert_eq!(best.source_pattern, "m3u8");
    }
}
