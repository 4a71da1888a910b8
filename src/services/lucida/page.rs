//! Extraction of the conversion result embedded in a Lucida page.
//!
//! The page is a server-rendered app; the fields we need appear either as
//! JSON (`"token":"..."`) or as JS object literals (`token:"..."`), so each
//! field has a pattern for both spellings. First match wins.

use std::sync::OnceLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;

use crate::model::ServiceCandidate;
use crate::services::{AccessToken, CatalogEntry};

struct Patterns {
    token: [Regex; 2],
    url: [Regex; 2],
    expiry: [Regex; 2],
    title: [Regex; 2],
    artists: Regex,
    name: Regex,
    isrc: Regex,
    hires: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("page pattern is valid");
        Patterns {
            token: [re(r#"token:"([^"]+)""#), re(r#""token"\s*:\s*"([^"]+)""#)],
            url: [re(r#""url":"([^"]+)""#), re(r#"url:"([^"]+)""#)],
            expiry: [re(r"tokenExpiry:(\d+)"), re(r#""tokenExpiry"\s*:\s*(\d+)"#)],
            title: [
                re(r#""title"\s*:\s*"((?:[^"\\]|\\.)+)""#),
                re(r#"title:"((?:[^"\\]|\\.)+)""#),
            ],
            artists: re(r#""?artists"?\s*:\s*\[([^\]]*)\]"#),
            name: re(r#""?name"?\s*:\s*"((?:[^"\\]|\\.)+)""#),
            isrc: re(r#""?isrc"?\s*:\s*"([A-Za-z0-9]{12})""#),
            hires: re(r#"HIRES_LOSSLESS|"?(?:maximum_?)?bit_?[dD]epth"?\s*:\s*24\b"#),
        }
    })
}

fn first_capture<'a>(html: &'a str, candidates: &[Regex]) -> Option<&'a str> {
    candidates
        .iter()
        .find_map(|re| re.captures(html))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Decode a JSON string body, falling back to the raw text.
fn unescape(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_else(|_| raw.replace("\\/", "/"))
}

/// Tokens are usually wrapped in two layers of base64 over Latin-1 text.
/// Anything that doesn't decode cleanly is used as-is.
pub fn decode_token(raw: &str) -> String {
    let latin1 = |bytes: Vec<u8>| bytes.into_iter().map(char::from).collect::<String>();
    STANDARD
        .decode(raw)
        .ok()
        .map(latin1)
        .and_then(|inner| STANDARD.decode(inner.trim()).ok())
        .map(latin1)
        .unwrap_or_else(|| raw.to_string())
}

/// Build a catalog entry from a page, or `None` if the page holds no match.
pub fn parse_page(html: &str, service: ServiceCandidate) -> Option<CatalogEntry> {
    let p = patterns();

    let token = first_capture(html, &p.token)?;
    let url = first_capture(html, &p.url)?;
    let expiry = first_capture(html, &p.expiry).and_then(|e| e.parse().ok());

    let title = first_capture(html, &p.title).map(unescape);
    let artists = p
        .artists
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|list| {
            p.name
                .captures_iter(list.as_str())
                .filter_map(|c| c.get(1))
                .map(|m| unescape(m.as_str()))
                .collect()
        })
        .unwrap_or_default();
    let isrc = p
        .isrc
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_uppercase());

    let quality_rank = match service {
        ServiceCandidate::Tidal | ServiceCandidate::Qobuz if p.hires.is_match(html) => 2,
        _ => 1,
    };

    Some(CatalogEntry {
        service,
        locator: unescape(url),
        title,
        artists,
        isrc,
        quality_rank,
        access: Some(AccessToken {
            primary: decode_token(token),
            expiry,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON_PAGE: &str = r#"<script>const data = {"token":"abc123","url":"https:\/\/tidal.com\/browse\/track\/12345","tokenExpiry":1735689600,"title":"Die With A Smile","artists":[{"name":"Lady Gaga","id":1},{"name":"Bruno Mars","id":2}],"isrc":"USUM72409273","audioQuality":"HIRES_LOSSLESS"};</script>"#;

    const JS_PAGE: &str = r#"<script>{token:"xyz",url:"https://www.qobuz.com/track/999",tokenExpiry:42,title:"Song"}</script>"#;

    #[test]
    fn test_parse_json_page() {
        let entry = parse_page(JSON_PAGE, ServiceCandidate::Tidal).unwrap();
        assert_eq!(entry.locator, "https://tidal.com/browse/track/12345");
        assert_eq!(entry.title.as_deref(), Some("Die With A Smile"));
        assert_eq!(entry.artists, vec!["Lady Gaga", "Bruno Mars"]);
        assert_eq!(entry.isrc.as_deref(), Some("USUM72409273"));
        assert_eq!(entry.quality_rank, 2);
        let access = entry.access.unwrap();
        assert_eq!(access.expiry, Some(1_735_689_600));
    }

    #[test]
    fn test_parse_js_literal_page() {
        let entry = parse_page(JS_PAGE, ServiceCandidate::Qobuz).unwrap();
        assert_eq!(entry.locator, "https://www.qobuz.com/track/999");
        assert_eq!(entry.title.as_deref(), Some("Song"));
        assert!(entry.artists.is_empty());
        assert_eq!(entry.quality_rank, 1);
        assert_eq!(entry.access.unwrap().expiry, Some(42));
    }

    #[test]
    fn test_page_without_token_has_no_entry() {
        assert!(parse_page("<html>No results</html>", ServiceCandidate::Deezer).is_none());
        assert!(parse_page(r#"{"url":"https://x"}"#, ServiceCandidate::Deezer).is_none());
    }

    #[test]
    fn test_decode_double_base64_token() {
        // base64(base64("secret"))
        let inner = STANDARD.encode("secret");
        let outer = STANDARD.encode(inner);
        assert_eq!(decode_token(&outer), "secret");
    }

    #[test]
    fn test_decode_plain_token_passes_through() {
        assert_eq!(decode_token("not*base64"), "not*base64");
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"https:\/\/a.b\/c"), "https://a.b/c");
        assert_eq!(unescape(r#"say \"hi\""#), "say \"hi\"");
    }
}
