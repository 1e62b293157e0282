//! Alert documents and the minimal MIME reading needed to get at them.
//!
//! Alert emails are single-part `text/plain` or `multipart/alternative`
//! messages, usually quoted-printable. Only the pieces the extractor needs
//! are read: `Subject`, `Date` (the dateline) and the first plain-text part.
//!
//! The raw message is held as a latin-1 view (one char per byte) while its
//! structure is parsed, so 8-bit bodies reach [`decode_charset`] with their
//! original bytes.

use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDate};
use regex::Regex;

use crate::CoreError;

static ENCODED_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"=\?(?P<charset>[^?]+)\?(?P<enc>[BbQq])\?(?P<text>[^?]*)\?=")
        .expect("encoded-word pattern")
});

/// Nesting limit for `multipart/*` bodies.
const MAX_MIME_DEPTH: usize = 8;

/// One unit of alert text plus what is known about when it was sent.
#[derive(Debug, Clone, Default)]
pub struct AlertDocument {
    /// Where the document came from, for diagnostics (usually a file name).
    pub label: String,
    pub subject: Option<String>,
    /// Date the alert was sent; anchors year-less report dates.
    pub dateline: Option<NaiveDate>,
    pub body: String,
}

impl AlertDocument {
    /// Wrap an already-extracted alert body.
    pub fn from_text(label: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_dateline(mut self, dateline: NaiveDate) -> Self {
        self.dateline = Some(dateline);
        self
    }

    /// Read an RFC 822 message (an `.eml` file).
    pub fn from_mime(label: impl Into<String>, raw: &[u8]) -> Result<Self, CoreError> {
        let text = byte_view(raw).replace("\r\n", "\n");
        let (headers, body) = split_entity(&text)
            .ok_or_else(|| CoreError::MalformedMessage("no blank line after headers".into()))?;

        let subject = headers
            .get("subject")
            .map(|s| decode_encoded_words(&String::from_utf8_lossy(&view_bytes(s))));
        let dateline = headers.get("date").and_then(parse_dateline);
        let body = plain_text(&headers, body, 0)?.ok_or(CoreError::NoPlainText)?;

        Ok(Self {
            label: label.into(),
            subject,
            dateline,
            body,
        })
    }
}

/// Unfolded header fields of one MIME entity, in order.
#[derive(Debug, Default)]
struct Headers(Vec<(String, String)>);

impl Headers {
    fn parse(block: &str) -> Self {
        let mut fields: Vec<(String, String)> = Vec::new();
        for line in block.lines() {
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = fields.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                fields.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
            }
        }
        Self(fields)
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// `(mime type, parameters)` of `Content-Type`, defaulting to `text/plain`.
    fn content_type(&self) -> (String, Vec<(String, String)>) {
        let raw = self.get("content-type").unwrap_or("text/plain");
        let mut parts = raw.split(';');
        let mime = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        let params = parts
            .filter_map(|p| p.split_once('='))
            .map(|(k, v)| {
                (
                    k.trim().to_ascii_lowercase(),
                    v.trim().trim_matches('"').to_string(),
                )
            })
            .collect();
        (mime, params)
    }
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Split an entity into its header block and body at the first blank line.
fn split_entity(text: &str) -> Option<(Headers, &str)> {
    if let Some(rest) = text.strip_prefix('\n') {
        return Some((Headers::default(), rest));
    }
    let (head, body) = text.split_once("\n\n")?;
    Some((Headers::parse(head), body))
}

fn plain_text(headers: &Headers, body: &str, depth: usize) -> Result<Option<String>, CoreError> {
    let (mime, params) = headers.content_type();

    if mime.starts_with("multipart/") {
        if depth >= MAX_MIME_DEPTH {
            return Ok(None);
        }
        let boundary = param(&params, "boundary")
            .ok_or_else(|| CoreError::MalformedMessage("multipart without boundary".into()))?;
        for part in multipart_parts(body, boundary) {
            let Some((part_headers, part_body)) = split_entity(part) else {
                continue;
            };
            if let Some(text) = plain_text(&part_headers, part_body, depth + 1)? {
                return Ok(Some(text));
            }
        }
        return Ok(None);
    }

    if mime != "text/plain" {
        return Ok(None);
    }

    let encoding = headers
        .get("content-transfer-encoding")
        .unwrap_or("7bit")
        .to_ascii_lowercase();
    let bytes = match encoding.as_str() {
        "quoted-printable" => decode_quoted_printable(&view_bytes(body)),
        "base64" => {
            let compact: String = body.split_whitespace().collect();
            STANDARD.decode(compact)?
        }
        _ => view_bytes(body),
    };
    Ok(Some(decode_charset(&bytes, param(&params, "charset"))))
}

/// Bodies of a multipart entity, between `--boundary` delimiter lines.
fn multipart_parts<'a>(body: &'a str, boundary: &str) -> Vec<&'a str> {
    let delimiter = format!("--{boundary}");
    let closing = format!("--{boundary}--");
    let mut parts = Vec::new();
    let mut start: Option<usize> = None;
    let mut offset = 0;

    for line in body.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == delimiter || trimmed == closing {
            if let Some(s) = start {
                parts.push(body[s..offset].trim_end_matches('\n'));
            }
            start = (trimmed == delimiter).then_some(offset + line.len());
            if trimmed == closing {
                break;
            }
        }
        offset += line.len();
    }
    parts
}

/// Latin-1 view of raw bytes: every byte becomes the char with that value.
fn byte_view(raw: &[u8]) -> String {
    raw.iter().map(|&b| char::from(b)).collect()
}

/// Inverse of [`byte_view`].
fn view_bytes(view: &str) -> Vec<u8> {
    view.chars().map(|c| u8::try_from(c).unwrap_or(b'?')).collect()
}

fn decode_quoted_printable(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'=' {
            // Soft line break.
            if bytes.get(i + 1) == Some(&b'\n') {
                i += 2;
                continue;
            }
            if let (Some(&hi), Some(&lo)) = (bytes.get(i + 1), bytes.get(i + 2))
                && let (Some(hi), Some(lo)) = (hex_value(hi), hex_value(lo))
            {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn decode_charset(bytes: &[u8], charset: Option<&str>) -> String {
    match charset.map(str::to_ascii_lowercase).as_deref() {
        Some("iso-8859-1" | "latin1" | "windows-1252" | "us-ascii") => {
            bytes.iter().map(|&b| b as char).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Decode RFC 2047 encoded words; whitespace between adjacent words is dropped.
fn decode_encoded_words(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_end = 0;
    let mut previous_was_word = false;

    for caps in ENCODED_WORD.captures_iter(value) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let gap = &value[last_end..whole.start()];
        if !(previous_was_word && gap.trim().is_empty()) {
            out.push_str(gap);
        }

        let text = &caps["text"];
        let bytes = if caps["enc"].eq_ignore_ascii_case("b") {
            STANDARD.decode(text).unwrap_or_else(|_| text.as_bytes().to_vec())
        } else {
            decode_quoted_printable(text.replace('_', " ").as_bytes())
        };
        out.push_str(&decode_charset(&bytes, Some(&caps["charset"])));

        last_end = whole.end();
        previous_was_word = true;
    }
    out.push_str(&value[last_end..]);
    out
}

/// Parse an RFC 2822 `Date` header into the sender's local calendar date.
fn parse_dateline(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    // Drop a trailing zone comment such as "(UTC)".
    let value = match value.rfind('(') {
        Some(i) if value.ends_with(')') => value[..i].trim_end(),
        _ => value,
    };
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_part_quoted_printable() {
        let raw = b"From: eBird <ebird-alert@birds.cornell.edu>\r\n\
Subject: [eBird Alert] Massachusetts Rare Bird Alert <hourly>\r\n\
Date: Sun, 08 Feb 2026 06:12:44 +0000 (UTC)\r\n\
Content-Type: text/plain; charset=UTF-8\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
Snowy Owl (Bubo scandiacus) (1)\r\n\
- Map: http://maps.google.com/?ie=3DUTF8&q=3D42.0,-70.0\r\n\
- Comments: \"A very long comment that the mailer wrapped with a soft =\r\n\
break\"\r\n";
        let doc = AlertDocument::from_mime("a.eml", raw).unwrap();
        assert_eq!(
            doc.subject.as_deref(),
            Some("[eBird Alert] Massachusetts Rare Bird Alert <hourly>")
        );
        assert_eq!(doc.dateline, NaiveDate::from_ymd_opt(2026, 2, 8));
        assert!(doc.body.contains("?ie=UTF8&q=42.0,-70.0"));
        assert!(doc.body.contains("with a soft break\""));
    }

    #[test]
    fn multipart_alternative_picks_plain_part() {
        let raw = "Subject: Alert\n\
Date: Sat, 7 Feb 2026 23:50:00 -0500\n\
MIME-Version: 1.0\n\
Content-Type: multipart/alternative;\n boundary=\"XYZ\"\n\
\n\
preamble\n\
--XYZ\n\
Content-Type: text/html; charset=UTF-8\n\
\n\
<p>html</p>\n\
--XYZ\n\
Content-Type: text/plain; charset=UTF-8\n\
Content-Transfer-Encoding: base64\n\
\n\
U25vd3kgT3ds\n\
--XYZ--\n";
        let doc = AlertDocument::from_mime("b.eml", raw.as_bytes()).unwrap();
        assert_eq!(doc.body, "Snowy Owl");
        assert_eq!(doc.dateline, NaiveDate::from_ymd_opt(2026, 2, 7));
    }

    #[test]
    fn html_only_message_has_no_plain_text() {
        let raw = b"Subject: x\nContent-Type: text/html\n\n<p>hi</p>\n";
        assert!(matches!(
            AlertDocument::from_mime("c.eml", raw),
            Err(CoreError::NoPlainText)
        ));
    }

    #[test]
    fn missing_header_separator_is_malformed() {
        assert!(matches!(
            AlertDocument::from_mime("d.eml", b"Subject: only headers"),
            Err(CoreError::MalformedMessage(_))
        ));
    }

    #[test]
    fn encoded_subject_words_are_decoded() {
        assert_eq!(
            decode_encoded_words("=?UTF-8?Q?Qu=C3=A9bec_Rare?= =?UTF-8?B?QmlyZHM=?= alert"),
            "Québec RareBirds alert"
        );
        assert_eq!(decode_encoded_words("plain subject"), "plain subject");
    }

    #[test]
    fn latin1_body_bytes_map_to_chars() {
        assert_eq!(decode_charset(&[0x51, 0xe9], Some("ISO-8859-1")), "Qé");
    }

    #[test]
    fn eight_bit_latin1_body_keeps_its_bytes() {
        let raw = b"Subject: Alerte\r\n\
Content-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: 8bit\r\n\
\r\n\
Qu\xe9bec\r\n";
        let doc = AlertDocument::from_mime("q.eml", raw).unwrap();
        assert_eq!(doc.body, "Qu\u{e9}bec\n");
    }

    #[test]
    fn eight_bit_utf8_body_and_raw_subject_survive() {
        let raw = "Subject: Qu\u{e9}bec alert\n\
Content-Type: text/plain; charset=utf-8\n\
\n\
Montr\u{e9}al\n";
        let doc = AlertDocument::from_mime("u.eml", raw.as_bytes()).unwrap();
        assert_eq!(doc.subject.as_deref(), Some("Qu\u{e9}bec alert"));
        assert_eq!(doc.body, "Montr\u{e9}al\n");
    }

    #[test]
    fn latin1_quoted_printable_body() {
        let raw = b"Content-Type: text/plain; charset=ISO-8859-1\n\
Content-Transfer-Encoding: quoted-printable\n\
\n\
Qu=E9bec\n";
        let doc = AlertDocument::from_mime("p.eml", raw).unwrap();
        assert_eq!(doc.body, "Qu\u{e9}bec\n");
    }

    #[test]
    fn from_text_has_no_dateline() {
        let doc = AlertDocument::from_text("x.txt", "body");
        assert!(doc.dateline.is_none());
        assert!(doc.subject.is_none());
    }
}
