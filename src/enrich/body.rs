//! Message body decoding and quote stripping
//!
//! Bodies arrive as raw message text (headers included) straight off the
//! archive stream. `decode_body` runs MIME traversal and transfer decoding
//! through mailparse and flattens rich text, so the pattern layer only ever
//! sees plain text. `strip_quoted` then removes quoted and forwarded
//! sections so a reply never attributes the quoted party's signature to the
//! sender.

use mailparse::ParsedMail;
use regex::Regex;
use std::sync::OnceLock;
use tracing::trace;

/// Decodes one raw message to plain text: picks the best text part, reverses
/// base64/quoted-printable transfer encoding, strips HTML if that is all
/// there is. A message that fails MIME parsing degrades to its raw body
/// after the header block rather than failing the contact.
pub fn decode_body(raw: &str) -> String {
    match mailparse::parse_mail(raw.as_bytes()) {
        Ok(parsed) => {
            if let Some(plain) = find_part(&parsed, "text/plain") {
                return plain;
            }
            if let Some(html) = find_part(&parsed, "text/html") {
                return strip_html(&html);
            }
            // Single-part message with an odd content type
            parsed.get_body().map(|b| maybe_strip_html(&b)).unwrap_or_default()
        }
        Err(e) => {
            trace!(error = %e, "MIME parse failed, using raw body");
            raw.split_once("\n\n")
                .map(|(_, body)| body.to_string())
                .unwrap_or_default()
        }
    }
}

fn find_part(mail: &ParsedMail, mimetype: &str) -> Option<String> {
    if mail.ctype.mimetype.eq_ignore_ascii_case(mimetype) {
        return mail.get_body().ok();
    }
    for part in &mail.subparts {
        if let Some(body) = find_part(part, mimetype) {
            return Some(body);
        }
    }
    None
}

fn maybe_strip_html(body: &str) -> String {
    if body.contains('<') && body.contains('>') && body.to_lowercase().contains("<br") {
        strip_html(body)
    } else {
        body.to_string()
    }
}

/// Flattens HTML to text: block tags become newlines, the rest is dropped,
/// a few common entities are decoded.
pub fn strip_html(html: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"(?is)<[^>]+>").unwrap());

    static BLOCK: OnceLock<Regex> = OnceLock::new();
    let block = BLOCK
        .get_or_init(|| Regex::new(r"(?i)<\s*(?:br|/p|/div|/tr|/li|/h[1-6])\s*/?\s*>").unwrap());

    static STYLE: OnceLock<Regex> = OnceLock::new();
    let style = STYLE
        .get_or_init(|| Regex::new(r"(?is)<\s*style[^>]*>.*?<\s*/\s*style\s*>").unwrap());

    static SCRIPT: OnceLock<Regex> = OnceLock::new();
    let script = SCRIPT
        .get_or_init(|| Regex::new(r"(?is)<\s*script[^>]*>.*?<\s*/\s*script\s*>").unwrap());

    let text = style.replace_all(html, "");
    let text = script.replace_all(&text, "");
    let text = block.replace_all(&text, "\n");
    let text = tag.replace_all(&text, "");
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

fn quote_markers() -> &'static [Regex] {
    static MARKERS: OnceLock<Vec<Regex>> = OnceLock::new();
    MARKERS.get_or_init(|| {
        vec![
            Regex::new(r"(?im)^On .{1,100} wrote:\s*$").unwrap(),
            Regex::new(r"(?im)^-{2,}\s*Original Message\s*-{2,}").unwrap(),
            Regex::new(r"(?im)^-{2,}\s*Forwarded message\s*-{2,}").unwrap(),
            Regex::new(r"(?im)^Begin forwarded message:").unwrap(),
            Regex::new(r"(?im)^From:\s.+$").unwrap(),
            Regex::new(r"(?im)^Sent from my ").unwrap(),
        ]
    })
}

/// Removes quoted and forwarded sections from a decoded body.
///
/// Everything from the first quote marker onward is discarded, as are `>`
/// prefixed lines above it. The sender's own text and signature always sit
/// above the first marker in practice.
pub fn strip_quoted(text: &str) -> String {
    let mut cut = text.len();
    for marker in quote_markers() {
        if let Some(m) = marker.find(text) {
            cut = cut.min(m.start());
        }
    }

    text[..cut]
        .lines()
        .filter(|line| !line.trim_start().starts_with('>'))
        .collect::<Vec<_>>()
        .join("\n")
}
