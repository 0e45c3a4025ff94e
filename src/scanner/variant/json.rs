use std::ops::Range;

use super::{rebuild_error, replacement_for, splice, InjectionPoint, LocationKind, Variant};
use crate::error::ScannerError;
use crate::http::HttpMessage;

const MAX_DEPTH: usize = 64;

/// String and number leaves of a JSON body, named by their key path
pub struct JsonVariant;

impl JsonVariant {
    fn is_json(message: &HttpMessage) -> bool {
        let declared = message
            .request
            .content_type()
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);
        declared
            || message
                .request_body
                .iter()
                .find(|b| !b.is_ascii_whitespace())
                .is_some_and(|b| *b == b'{' || *b == b'[')
    }
}

impl Variant for JsonVariant {
    fn kind(&self) -> LocationKind {
        LocationKind::JsonValue
    }

    fn extract(&self, message: &HttpMessage) -> Vec<InjectionPoint> {
        if message.request_body.is_empty() || !Self::is_json(message) {
            return Vec::new();
        }

        let Ok(body) = std::str::from_utf8(&message.request_body) else {
            return Vec::new();
        };

        let mut scanner = LeafScanner::new(body);
        match scanner.document() {
            Some(()) => scanner.points,
            None => {
                tracing::debug!(url = %message.url_string(), offset = scanner.pos, "Malformed JSON body");
                Vec::new()
            }
        }
    }

    fn rebuild(
        &self,
        message: &mut HttpMessage,
        point: &InjectionPoint,
        value: &str,
        escaped: bool,
    ) -> Result<(), ScannerError> {
        let body = std::str::from_utf8(&message.request_body)
            .map_err(|_| rebuild_error(point, "body is not UTF-8"))?;

        let quoted = point
            .span
            .start
            .checked_sub(1)
            .and_then(|i| body.as_bytes().get(i))
            == Some(&b'"');

        let replacement = replacement_for(point, value, escaped, |v| {
            let encoded = serde_json::to_string(v).unwrap_or_else(|_| format!("\"{}\"", v));
            if quoted {
                encoded[1..encoded.len() - 1].to_string()
            } else if serde_json::from_str::<serde_json::Number>(v).is_ok() {
                v.to_string()
            } else {
                encoded
            }
        });

        let rebuilt = splice(body, point, &replacement)?;
        message.set_request_body(rebuilt.into_bytes());
        Ok(())
    }
}

/// Single pass over a JSON document recording leaf value spans
struct LeafScanner<'a> {
    src: &'a str,
    pos: usize,
    points: Vec<InjectionPoint>,
}

impl<'a> LeafScanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            points: Vec::new(),
        }
    }

    fn document(&mut self) -> Option<()> {
        self.value("", 0)?;
        self.skip_ws();
        (self.pos == self.src.len()).then_some(())
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Option<()> {
        self.skip_ws();
        (self.peek()? == byte).then(|| self.pos += 1)
    }

    fn value(&mut self, path: &str, depth: usize) -> Option<()> {
        if depth > MAX_DEPTH {
            return None;
        }

        self.skip_ws();
        match self.peek()? {
            b'{' => self.object(path, depth),
            b'[' => self.array(path, depth),
            b'"' => {
                let span = self.string()?;
                let raw = &self.src[span.clone()];
                let value = serde_json::from_str::<String>(&format!("\"{}\"", raw))
                    .unwrap_or_else(|_| raw.to_string());
                self.leaf(path, value, span);
                Some(())
            }
            b'-' | b'0'..=b'9' => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|b| b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E'))
                {
                    self.pos += 1;
                }
                let raw = &self.src[start..self.pos];
                serde_json::from_str::<serde_json::Number>(raw).ok()?;
                self.leaf(path, raw.to_string(), start..self.pos);
                Some(())
            }
            _ => {
                for literal in ["true", "false", "null"] {
                    if self.src.as_bytes()[self.pos..].starts_with(literal.as_bytes()) {
                        self.pos += literal.len();
                        return Some(());
                    }
                }
                None
            }
        }
    }

    fn object(&mut self, path: &str, depth: usize) -> Option<()> {
        self.pos += 1;
        self.skip_ws();
        if self.peek()? == b'}' {
            self.pos += 1;
            return Some(());
        }

        loop {
            self.skip_ws();
            if self.peek()? != b'"' {
                return None;
            }
            let key_span = self.string()?;
            let key = serde_json::from_str::<String>(&format!("\"{}\"", &self.src[key_span.clone()]))
                .unwrap_or_else(|_| self.src[key_span].to_string());
            self.expect(b':')?;

            let child = if path.is_empty() {
                key
            } else {
                format!("{}.{}", path, key)
            };
            self.value(&child, depth + 1)?;

            self.skip_ws();
            match self.peek()? {
                b',' => self.pos += 1,
                b'}' => {
                    self.pos += 1;
                    return Some(());
                }
                _ => return None,
            }
        }
    }

    fn array(&mut self, path: &str, depth: usize) -> Option<()> {
        self.pos += 1;
        self.skip_ws();
        if self.peek()? == b']' {
            self.pos += 1;
            return Some(());
        }

        let mut index = 0;
        loop {
            self.value(&format!("{}[{}]", path, index), depth + 1)?;
            index += 1;

            self.skip_ws();
            match self.peek()? {
                b',' => self.pos += 1,
                b']' => {
                    self.pos += 1;
                    return Some(());
                }
                _ => return None,
            }
        }
    }

    /// Consume a string literal, returning the range between its quotes
    fn string(&mut self) -> Option<Range<usize>> {
        self.pos += 1;
        let start = self.pos;
        loop {
            match self.peek()? {
                b'"' => {
                    let span = start..self.pos;
                    self.pos += 1;
                    return Some(span);
                }
                b'\\' => self.pos += 2,
                _ => self.pos += 1,
            }
        }
    }

    fn leaf(&mut self, path: &str, value: String, span: Range<usize>) {
        let name = if path.is_empty() { "$".to_string() } else { path.to_string() };
        self.points.push(InjectionPoint {
            kind: LocationKind::JsonValue,
            name,
            value,
            raw_value: self.src[span.clone()].to_string(),
            span,
            position: self.points.len(),
            segment: 0,
        });
    }
}
