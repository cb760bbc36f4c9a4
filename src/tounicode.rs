//! ToUnicode CMap parsing for composite fonts
//!
//! Invoices rendered with embedded Type0 fonts show text as 2-byte CIDs.
//! The font's ToUnicode CMap maps those back to Unicode.

use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Document, Object, Stream};
use std::collections::HashMap;
use std::io::Read;

/// A parsed ToUnicode CMap mapping CIDs to Unicode strings
#[derive(Debug, Default, Clone)]
pub struct ToUnicodeCMap {
    /// Direct character mappings (CID -> Unicode string)
    pub char_map: HashMap<u16, String>,
    /// Range mappings (start_cid, end_cid, base_codepoint)
    pub ranges: Vec<(u16, u16, u32)>,
}

/// A token of CMap syntax relevant to bf sections
#[derive(Debug, PartialEq)]
enum Token {
    Hex(String),
    ArrayStart,
    ArrayEnd,
}

impl ToUnicodeCMap {
    /// Parse a ToUnicode CMap from its decompressed content
    pub fn parse(content: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(content);
        let mut cmap = ToUnicodeCMap::default();

        for section in sections(&text, "beginbfchar", "endbfchar") {
            let tokens = tokenize(section);
            for pair in tokens.chunks_exact(2) {
                if let [Token::Hex(src), Token::Hex(dst)] = pair {
                    if let (Some(src), Some(dst)) =
                        (parse_hex_u16(src), hex_to_unicode_string(dst))
                    {
                        cmap.char_map.insert(src, dst);
                    }
                }
            }
        }

        for section in sections(&text, "beginbfrange", "endbfrange") {
            cmap.parse_bfrange(&tokenize(section));
        }

        if cmap.char_map.is_empty() && cmap.ranges.is_empty() {
            None
        } else {
            Some(cmap)
        }
    }

    /// Load and parse the ToUnicode stream referenced by a font dictionary
    pub fn from_font(doc: &Document, font: &Dictionary) -> Option<Self> {
        let stream = match font.get(b"ToUnicode").ok()? {
            Object::Reference(id) => doc.get_object(*id).ok()?.as_stream().ok()?,
            Object::Stream(stream) => stream,
            _ => return None,
        };
        Self::parse(&stream_content(stream))
    }

    /// `<start> <end> <base>` or `<start> <end> [<dst> ...]` triplets
    fn parse_bfrange(&mut self, tokens: &[Token]) {
        let mut i = 0;
        while i + 2 < tokens.len() {
            let (Token::Hex(start), Token::Hex(end)) = (&tokens[i], &tokens[i + 1]) else {
                i += 1;
                continue;
            };
            let (Some(start), Some(end)) = (parse_hex_u16(start), parse_hex_u16(end)) else {
                i += 3;
                continue;
            };

            match &tokens[i + 2] {
                Token::Hex(base) => {
                    if let Some(base) = parse_hex_u32(base) {
                        self.ranges.push((start, end, base));
                    }
                    i += 3;
                }
                Token::ArrayStart => {
                    let mut j = i + 3;
                    let mut cid = start;
                    while let Some(Token::Hex(dst)) = tokens.get(j) {
                        if let Some(dst) = hex_to_unicode_string(dst) {
                            self.char_map.insert(cid, dst);
                        }
                        cid = cid.saturating_add(1);
                        j += 1;
                    }
                    // skip the closing bracket
                    i = j + 1;
                }
                Token::ArrayEnd => i += 3,
            }
        }
    }

    /// Look up a CID and return the Unicode string
    pub fn lookup(&self, cid: u16) -> Option<String> {
        if let Some(s) = self.char_map.get(&cid) {
            return Some(s.clone());
        }

        self.ranges
            .iter()
            .find(|&&(start, end, _)| cid >= start && cid <= end)
            .and_then(|&(start, _, base)| char::from_u32(base + u32::from(cid - start)))
            .map(String::from)
    }

    /// Decode a byte slice of CIDs (2 bytes each, big-endian) to a Unicode string
    pub fn decode_cids(&self, bytes: &[u8]) -> String {
        bytes
            .chunks_exact(2)
            .filter_map(|chunk| {
                let cid = u16::from_be_bytes([chunk[0], chunk[1]]);
                self.lookup(cid)
                    .or_else(|| char::from_u32(u32::from(cid)).map(String::from))
            })
            .collect()
    }
}

/// Bodies between every `begin` ... `end` keyword pair
fn sections<'t>(text: &'t str, begin: &str, end: &str) -> Vec<&'t str> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(begin) {
        let body = &rest[start + begin.len()..];
        let Some(stop) = body.find(end) else {
            break;
        };
        found.push(&body[..stop]);
        rest = &body[stop + end.len()..];
    }
    found
}

fn tokenize(section: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = section.chars();
    while let Some(c) = chars.next() {
        match c {
            '<' => {
                let hex: String = chars
                    .by_ref()
                    .take_while(|&c| c != '>')
                    .filter(|c| !c.is_whitespace())
                    .collect();
                tokens.push(Token::Hex(hex));
            }
            '[' => tokens.push(Token::ArrayStart),
            ']' => tokens.push(Token::ArrayEnd),
            _ => {}
        }
    }
    tokens
}

/// Stream bytes with FlateDecode undone when the stream declares it
fn stream_content(stream: &Stream) -> Vec<u8> {
    let flate = match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => name == b"FlateDecode",
        Ok(Object::Array(filters)) => filters
            .iter()
            .any(|f| matches!(f, Object::Name(name) if name == b"FlateDecode")),
        _ => false,
    };

    if flate {
        let mut decompressed = Vec::new();
        if ZlibDecoder::new(stream.content.as_slice())
            .read_to_end(&mut decompressed)
            .is_ok()
        {
            return decompressed;
        }
    }
    stream.content.clone()
}

fn parse_hex_u16(hex: &str) -> Option<u16> {
    u16::from_str_radix(hex, 16).ok()
}

fn parse_hex_u32(hex: &str) -> Option<u32> {
    u32::from_str_radix(hex, 16).ok()
}

/// Convert a UTF-16BE hex string to a Unicode string
fn hex_to_unicode_string(hex: &str) -> Option<String> {
    let units: Vec<u16> = hex
        .as_bytes()
        .chunks_exact(4)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .filter_map(|unit| u16::from_str_radix(unit, 16).ok())
        .collect();

    let decoded: String = char::decode_utf16(units).filter_map(Result::ok).collect();
    if decoded.is_empty() {
        None
    } else {
        Some(decoded)
    }
}
