//! Streaming mbox message reader
//!
//! A message begins at a line starting `"From "` and runs until the next such
//! line. Headers are `Name: value` pairs with RFC-822 folding (continuation
//! lines start with whitespace) terminated by a blank line; everything after
//! is body. The reader yields one [`RawMessage`] at a time and caps how much
//! body it retains, so memory stays bounded regardless of archive size.

use regex::Regex;
use std::io::BufRead;
use std::sync::OnceLock;

/// Body bytes retained per message. Signature blocks live near the end of a
/// text part, so truncated tails of enormous messages are acceptable.
const MAX_BODY_BYTES: usize = 262_144;

/// One message as it appeared in the archive, headers unfolded
#[derive(Debug, Clone, Default)]
pub struct RawMessage {
    /// Header (name, value) pairs in file order, names as written
    pub headers: Vec<(String, String)>,
    /// Body text, possibly truncated at [`MAX_BODY_BYTES`]
    pub body: String,
    /// Whether an attachment disposition line was seen anywhere in the message
    pub has_attachment: bool,
}

impl RawMessage {
    /// First header with the given name, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All addresses in the `From:` header (the first is the sender)
    pub fn sender(&self) -> Option<String> {
        self.header("From")
            .and_then(|v| extract_addresses(v).into_iter().next())
    }

    /// Addresses across `To:` and `Cc:` headers
    pub fn recipients(&self) -> Vec<String> {
        let mut out = Vec::new();
        for name in ["To", "Cc"] {
            if let Some(value) = self.header(name) {
                for addr in extract_addresses(value) {
                    if !out.contains(&addr) {
                        out.push(addr);
                    }
                }
            }
        }
        out
    }

    /// Full message text for MIME parsing downstream
    pub fn raw_text(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out
    }
}

/// Streaming reader over one mbox file
pub struct MboxReader<R: BufRead> {
    reader: R,
    /// Set once the first `From ` separator has been consumed
    in_message: bool,
    done: bool,
}

impl<R: BufRead> MboxReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            in_message: false,
            done: false,
        }
    }

    /// Reads the next message, or `None` at end of file
    ///
    /// Lines that fail UTF-8 decoding are replaced lossily rather than
    /// aborting the scan; a malformed message never fails the run.
    pub fn next_message(&mut self) -> std::io::Result<Option<RawMessage>> {
        if self.done {
            return Ok(None);
        }

        // Skip to the first separator on the very first call
        let mut buf = Vec::new();
        if !self.in_message {
            loop {
                buf.clear();
                if self.reader.read_until(b'\n', &mut buf)? == 0 {
                    self.done = true;
                    return Ok(None);
                }
                if buf.starts_with(b"From ") {
                    self.in_message = true;
                    break;
                }
            }
        }

        let mut message = RawMessage::default();
        let mut in_headers = true;
        let mut body_len = 0usize;

        loop {
            buf.clear();
            if self.reader.read_until(b'\n', &mut buf)? == 0 {
                self.done = true;
                break;
            }
            if buf.starts_with(b"From ") {
                // Next message's separator; leave in_message set
                break;
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\r', '\n']);

            if in_headers {
                if line.is_empty() {
                    in_headers = false;
                    continue;
                }
                if (line.starts_with(' ') || line.starts_with('\t')) && !message.headers.is_empty()
                {
                    // Folded continuation of the previous header
                    let last = message.headers.last_mut().unwrap();
                    last.1.push(' ');
                    last.1.push_str(line.trim_start());
                } else if let Some(colon) = line.find(':') {
                    let name = line[..colon].trim().to_string();
                    let value = line[colon + 1..].trim().to_string();
                    message.headers.push((name, value));
                }
                // A header line with no colon is malformed; skip the line,
                // never the message
            } else {
                if line.to_ascii_lowercase().contains("content-disposition: attachment") {
                    message.has_attachment = true;
                }
                if body_len < MAX_BODY_BYTES {
                    let mut take = (MAX_BODY_BYTES - body_len).min(line.len());
                    // The cap is in bytes; back off to a char boundary so a
                    // multi-byte character straddling it cannot split
                    while !line.is_char_boundary(take) {
                        take -= 1;
                    }
                    message.body.push_str(&line[..take]);
                    message.body.push('\n');
                    body_len += take + 1;
                }
            }
        }

        Ok(Some(message))
    }
}

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").unwrap()
    })
}

/// Extracts every embedded email address, normalized to lowercase
pub fn extract_addresses(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for m in address_pattern().find_iter(text) {
        let addr = m.as_str().to_lowercase();
        if !out.contains(&addr) {
            out.push(addr);
        }
    }
    out
}

/// Display-name portion of a `From:` value, e.g. `Jane Doe <jane@x.com>`
pub fn parse_display_name(from_value: &str) -> Option<String> {
    let name = match from_value.find('<') {
        Some(pos) => &from_value[..pos],
        None => return None,
    };
    let name = name.trim().trim_matches('"').trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = "\
From jane.doe@example.com Thu Jan 11 09:00:00 2024
From: \"Jane Doe\" <jane.doe@example.com>
To: op@lender.com
Subject: Rate Lock
 Confirmation
Date: Thu, 11 Jan 2024 09:00:00 -0700

Hi, locking today works.

From op@lender.com Thu Jan 11 10:00:00 2024
From: Op <op@lender.com>
To: jane.doe@example.com
Cc: partner@title.com
Subject: Re: Rate Lock Confirmation

Confirmed.
Content-Disposition: attachment; filename=lock.pdf
";

    fn read_all(input: &str) -> Vec<RawMessage> {
        let mut reader = MboxReader::new(Cursor::new(input));
        let mut out = Vec::new();
        while let Some(msg) = reader.next_message().unwrap() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_message_boundaries() {
        let messages = read_all(SAMPLE);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_folded_header_unfolds() {
        let messages = read_all(SAMPLE);
        assert_eq!(messages[0].header("Subject"), Some("Rate Lock Confirmation"));
    }

    #[test]
    fn test_sender_and_recipients() {
        let messages = read_all(SAMPLE);
        assert_eq!(messages[0].sender().as_deref(), Some("jane.doe@example.com"));
        assert_eq!(
            messages[1].recipients(),
            vec!["jane.doe@example.com".to_string(), "partner@title.com".to_string()]
        );
    }

    #[test]
    fn test_body_and_attachment_flag() {
        let messages = read_all(SAMPLE);
        assert!(messages[0].body.contains("locking today"));
        assert!(!messages[0].has_attachment);
        assert!(messages[1].has_attachment);
    }

    #[test]
    fn test_preamble_before_first_separator_is_skipped() {
        let input = format!("garbage line\nanother\n{}", SAMPLE);
        let messages = read_all(&input);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_header_without_colon_is_skipped_not_fatal() {
        let input = "\
From a@b.com Mon Jan 1 00:00:00 2024
From: a@b.com
this line has no colon and is not folded
Subject: Still here

body
";
        let messages = read_all(input);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].header("Subject"), Some("Still here"));
    }

    #[test]
    fn test_extract_addresses_dedupes_and_lowercases() {
        let addrs = extract_addresses("Jane <Jane.Doe@Example.com>, jane.doe@example.com, x@y.org");
        assert_eq!(addrs, vec!["jane.doe@example.com".to_string(), "x@y.org".to_string()]);
    }

    #[test]
    fn test_parse_display_name() {
        assert_eq!(
            parse_display_name("\"Jane Doe\" <jane@x.com>").as_deref(),
            Some("Jane Doe")
        );
        assert_eq!(parse_display_name("jane@x.com"), None);
        assert_eq!(parse_display_name("<jane@x.com>"), None);
    }

    #[test]
    fn test_raw_text_round_trip_shape() {
        let messages = read_all(SAMPLE);
        let raw = messages[0].raw_text();
        assert!(raw.starts_with("From: \"Jane Doe\" <jane.doe@example.com>\n"));
        assert!(raw.contains("\n\nHi, locking today works."));
    }

    #[test]
    fn test_body_cap_lands_on_char_boundary() {
        // A multi-byte character straddling the byte cap must truncate
        // cleanly, not panic mid-character
        let mut line = "a".repeat(MAX_BODY_BYTES - 1);
        line.push_str("éééé");
        let input = format!(
            "From big@example.com Thu Jan 11 09:00:00 2024\n\
             From: <big@example.com>\n\
             \n\
             {}\n",
            line
        );

        let mut reader = MboxReader::new(Cursor::new(input));
        let message = reader.next_message().unwrap().unwrap();
        assert!(message.body.len() <= MAX_BODY_BYTES);
        assert!(message.body.ends_with('\n'));
        assert!(reader.next_message().unwrap().is_none());
    }
}
