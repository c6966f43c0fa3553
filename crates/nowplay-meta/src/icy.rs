//! ICY metadata framing.
//!
//! Stations that honour `Icy-MetaData: 1` declare `icy-metaint: N` in the
//! response headers and then interleave, after every N bytes of audio, one
//! length byte L and L*16 bytes of `key='value';` text (NUL-padded to the
//! 16-byte boundary). This module owns that wire layer: interval parsing,
//! block reading over any async reader, and the `StreamTitle` extraction
//! rules shared by every strategy.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::Result;

const STREAM_TITLE_KEY: &str = "StreamTitle=";

/// Request header asking a server to interleave metadata.
pub const ICY_METADATA: &str = "Icy-MetaData";
/// Response header declaring the audio byte interval between blocks.
pub const ICY_METAINT: &str = "icy-metaint";
pub const ICY_NAME: &str = "icy-name";
pub const ICY_DESCRIPTION: &str = "icy-description";

/// Largest interval a sane server declares; anything above means the header
/// is garbage, not audio framing.
pub(crate) const MAX_METAINT: usize = 256_000;

/// Parses an `icy-metaint` header value. `None` for anything that is not a
/// positive integer within the sanity bound.
pub fn parse_metaint(raw: &str) -> Option<usize> {
    raw.trim()
        .parse::<usize>()
        .ok()
        .filter(|v| (1..=MAX_METAINT).contains(v))
}

/// Pulls the `StreamTitle` value out of one decoded metadata block.
///
/// Stations do not escape quotes inside values, so a closing quote only
/// terminates the value when it is followed by end-of-input or by a `;` that
/// starts another `key=value` pair. With no such terminator the last quote
/// wins, and with no quoting at all the value runs to the first `;`.
/// Returns `""` when the key is absent or the value is empty.
pub fn extract_stream_title(block: &[u8]) -> String {
    let lossy = String::from_utf8_lossy(block);
    let text = lossy.trim_end_matches('\0');

    let Some(idx) = text.find(STREAM_TITLE_KEY) else {
        return String::new();
    };
    let mut value = text[idx + STREAM_TITLE_KEY.len()..].trim();
    if value.is_empty() {
        return String::new();
    }

    let quote = match value.as_bytes()[0] {
        q @ (b'\'' | b'"') => Some(q),
        _ => None,
    };
    if let Some(q) = quote {
        let inner = &value[1..];
        let bytes = inner.as_bytes();
        let mut end = None;
        for i in 0..bytes.len() {
            if bytes[i] != q {
                continue;
            }
            let mut j = i + 1;
            while j < bytes.len() && (bytes[j] == b' ' || bytes[j] == b'\t') {
                j += 1;
            }
            if j >= bytes.len() {
                end = Some(i);
                break;
            }
            if bytes[j] == b';' && inner[j + 1..].contains('=') {
                end = Some(i);
                break;
            }
        }
        let end = end.or_else(|| inner.rfind(char::from(q)));
        value = match end {
            Some(e) => &inner[..e],
            None => inner,
        };
    } else if let Some(end) = value.find(';') {
        value = &value[..end];
    }

    clean_text(value)
}

/// Trim plus HTML entity decoding; stations routinely double-encode `&` and
/// `'` in titles and station names.
pub fn clean_text(raw: &str) -> String {
    unescape_entities(raw.trim())
}

fn unescape_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '&' {
            out.push(ch);
            continue;
        }

        let mut entity = String::new();
        let mut terminated = false;
        while let Some(&c) = chars.peek() {
            if c == ';' {
                chars.next();
                terminated = true;
                break;
            }
            if entity.len() >= 12 {
                break;
            }
            chars.next();
            entity.push(c);
        }

        let decoded = if terminated {
            decode_entity(&entity)
        } else {
            None
        };
        match decoded {
            Some(c) => out.push(c),
            None => {
                out.push('&');
                out.push_str(&entity);
                if terminated {
                    out.push(';');
                }
            }
        }
    }
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                None
            }
        }
    }
}

/// Skips `n` bytes of audio payload ahead of a metadata block.
pub async fn skip_audio<R>(reader: &mut R, n: usize) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    let mut left = n;
    while left > 0 {
        let chunk = left.min(buf.len());
        reader.read_exact(&mut buf[..chunk]).await?;
        left -= chunk;
    }
    Ok(())
}

/// Reads one length-prefixed metadata block. `Ok(None)` means the stream
/// declared a zero-length block at this interval.
pub async fn read_raw_block<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len = [0u8; 1];
    reader.read_exact(&mut len).await?;
    if len[0] == 0 {
        return Ok(None);
    }
    let mut block = vec![0u8; usize::from(len[0]) * 16];
    reader.read_exact(&mut block).await?;
    Ok(Some(block))
}

/// Skips one audio interval and decodes the next block's title. `Ok(None)`
/// covers both a zero-length block and a block without a usable title.
pub async fn read_meta_block<R>(reader: &mut R, metaint: usize) -> Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    skip_audio(reader, metaint).await?;
    match read_raw_block(reader).await? {
        Some(block) => {
            let title = extract_stream_title(&block);
            Ok((!title.is_empty()).then_some(title))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_stream_title() {
        let cases: &[(&str, &[u8], &str)] = &[
            ("single quotes simple", b"StreamTitle='Artist - Track';", "Artist - Track"),
            (
                "quoted apostrophe",
                b"StreamTitle='JANE'S ADDICTION - BEEN CAUGHT STEALING';",
                "JANE'S ADDICTION - BEEN CAUGHT STEALING",
            ),
            (
                "double quotes",
                b"StreamTitle=\"Double Quoted Title\";",
                "Double Quoted Title",
            ),
            (
                "missing terminator uses entire tail",
                b"StreamTitle='No Terminator",
                "No Terminator",
            ),
            (
                "trim spaces and html entities",
                b"StreamTitle=' AC/DC &amp; Friends ';",
                "AC/DC & Friends",
            ),
            ("empty result", b"StreamTitle='';", ""),
            ("no stream title present", b"StreamUrl='http://example'", ""),
            (
                "unquoted cut at semicolon",
                b"StreamTitle=Plain Title;StreamUrl='x';",
                "Plain Title",
            ),
            (
                "second pair after quoted value",
                b"StreamTitle='It's Raining';StreamUrl='http://x';",
                "It's Raining",
            ),
            (
                "numeric entity",
                b"StreamTitle='Guns N&#39; Roses - Patience';",
                "Guns N' Roses - Patience",
            ),
            (
                "nul padded unquoted tail",
                b"StreamTitle=Late Night Mix\x00\x00\x00",
                "Late Night Mix",
            ),
        ];

        for (name, block, want) in cases {
            assert_eq!(&extract_stream_title(block), want, "case: {name}");
        }
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  hello  "), "hello");
        assert_eq!(clean_text("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(clean_text("&#x27;tis"), "'tis");
        // single decoding pass only
        assert_eq!(clean_text("&amp;amp;"), "&amp;");
        // unknown or dangling ampersands survive untouched
        assert_eq!(clean_text("AC&DC"), "AC&DC");
        assert_eq!(clean_text("R&B; soul"), "R&B; soul");
    }

    #[test]
    fn test_parse_metaint() {
        assert_eq!(parse_metaint("16000"), Some(16000));
        assert_eq!(parse_metaint(" 1 "), Some(1));
        assert_eq!(parse_metaint("0"), None);
        assert_eq!(parse_metaint("-1"), None);
        assert_eq!(parse_metaint("999999999"), None);
        assert_eq!(parse_metaint("banana"), None);
    }

    fn framed(audio: usize, meta: &str) -> Vec<u8> {
        let mut body = vec![0u8; audio];
        let mut block = meta.as_bytes().to_vec();
        while block.len() % 16 != 0 {
            block.push(0);
        }
        body.push((block.len() / 16) as u8);
        body.extend_from_slice(&block);
        body
    }

    #[tokio::test]
    async fn test_read_meta_block_with_title() {
        let body = framed(32, "StreamTitle='Song One';");
        let mut reader: &[u8] = &body;
        let got = read_meta_block(&mut reader, 32).await.unwrap();
        assert_eq!(got.as_deref(), Some("Song One"));
    }

    #[tokio::test]
    async fn test_read_meta_block_zero_length() {
        let body = vec![0u8; 17]; // 16 audio bytes + zero length byte
        let mut reader: &[u8] = &body;
        let got = read_meta_block(&mut reader, 16).await.unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_read_meta_block_without_title_is_none() {
        let body = framed(8, "StreamUrl='http://x';");
        let mut reader: &[u8] = &body;
        let got = read_meta_block(&mut reader, 8).await.unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_read_meta_block_truncated_stream_errors() {
        let mut body = framed(16, "StreamTitle='cut';");
        body.truncate(body.len() - 4);
        let mut reader: &[u8] = &body;
        assert!(read_meta_block(&mut reader, 16).await.is_err());
    }
}
