use super::{rebuild_error, replacement_for, splice, InjectionPoint, LocationKind, Variant};
use crate::error::ScannerError;
use crate::http::HttpMessage;

/// Text content of leaf elements in an XML body
pub struct XmlVariant;

impl XmlVariant {
    fn is_xml(message: &HttpMessage) -> bool {
        let declared = message
            .request
            .content_type()
            .map(|ct| ct.to_ascii_lowercase().contains("xml"))
            .unwrap_or(false);
        declared
            || message
                .request_body
                .iter()
                .find(|b| !b.is_ascii_whitespace())
                .is_some_and(|b| *b == b'<')
    }
}

impl Variant for XmlVariant {
    fn kind(&self) -> LocationKind {
        LocationKind::XmlValue
    }

    fn extract(&self, message: &HttpMessage) -> Vec<InjectionPoint> {
        if message.request_body.is_empty() || !Self::is_xml(message) {
            return Vec::new();
        }

        let Ok(body) = std::str::from_utf8(&message.request_body) else {
            return Vec::new();
        };

        leaf_points(body).unwrap_or_else(|| {
            tracing::debug!(url = %message.url_string(), "Malformed XML body");
            Vec::new()
        })
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
        let replacement = replacement_for(point, value, escaped, escape);
        let rebuilt = splice(body, point, &replacement)?;
        message.set_request_body(rebuilt.into_bytes());
        Ok(())
    }
}

/// Walk the tags once; an element whose next tag is its own end tag is a leaf
fn leaf_points(body: &str) -> Option<Vec<InjectionPoint>> {
    let mut points = Vec::new();
    let mut open: Option<(&str, usize)> = None;
    let mut pos = 0;

    while let Some(offset) = body[pos..].find('<') {
        let lt = pos + offset;
        let rest = &body[lt..];

        if rest.starts_with("<!--") {
            pos = lt + rest.find("-->")? + 3;
            open = None;
        } else if rest.starts_with("<?") {
            pos = lt + rest.find("?>")? + 2;
        } else if rest.starts_with("<!") {
            pos = lt + rest.find('>')? + 1;
            open = None;
        } else if let Some(closing) = rest.strip_prefix("</") {
            let end = closing.find('>')?;
            let name = closing[..end].trim();
            if let Some((open_name, start)) = open.take() {
                if open_name == name {
                    let raw = &body[start..lt];
                    points.push(InjectionPoint {
                        kind: LocationKind::XmlValue,
                        name: name.to_string(),
                        value: unescape(raw),
                        raw_value: raw.to_string(),
                        span: start..lt,
                        position: points.len(),
                        segment: 0,
                    });
                }
            }
            pos = lt + 2 + end + 1;
        } else {
            let gt = lt + tag_end(rest)?;
            let tag = &body[lt + 1..gt];
            let name = tag
                .split(|c: char| c.is_whitespace() || c == '/')
                .next()
                .unwrap_or_default();
            if name.is_empty() {
                return None;
            }
            open = if tag.ends_with('/') { None } else { Some((name, gt + 1)) };
            pos = gt + 1;
        }
    }

    Some(points)
}

/// Offset of the `>` closing a start tag, skipping quoted attribute values
fn tag_end(tag: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in tag.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '>') => return Some(i),
            _ => {}
        }
    }
    None
}

fn unescape(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
