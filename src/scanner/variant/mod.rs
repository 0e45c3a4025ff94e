//! Injection point variants
//!
//! A variant knows one place in a request that carries parameters. It can
//! list the parameters as injection points and rewrite one of them.
//! Rebuilding with a point's own value reproduces the original bytes.

mod cookie;
mod form;
mod header;
mod json;
mod params;
mod path;
mod query;
mod xml;

pub use cookie::CookieVariant;
pub use form::FormBodyVariant;
pub use header::HeaderVariant;
pub use json::JsonVariant;
pub use path::UrlPathVariant;
pub use query::UrlQueryVariant;
pub use xml::XmlVariant;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::error::ScannerError;
use crate::http::HttpMessage;
use crate::scanner::policies::PolicySettings;

/// Where in a request an injection point lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    UrlQuery,
    UrlPath,
    BodyParam,
    Cookie,
    Header,
    JsonValue,
    XmlValue,
}

impl LocationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationKind::UrlQuery => "url_query",
            LocationKind::UrlPath => "url_path",
            LocationKind::BodyParam => "body_param",
            LocationKind::Cookie => "cookie",
            LocationKind::Header => "header",
            LocationKind::JsonValue => "json_value",
            LocationKind::XmlValue => "xml_value",
        }
    }
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate site for payload substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionPoint {
    /// Location kind
    pub kind: LocationKind,

    /// Parameter name
    pub name: String,

    /// Decoded value
    pub value: String,

    /// Value exactly as it appears in the request
    pub raw_value: String,

    /// Byte range of `raw_value` inside its segment
    pub span: Range<usize>,

    /// Index among the points this variant produced
    pub position: usize,

    /// Owning segment (header index for header-borne points, otherwise 0)
    pub segment: usize,
}

/// A strategy for locating and rewriting one kind of parameter
pub trait Variant: Send + Sync {
    fn kind(&self) -> LocationKind;

    /// Injection points of this kind; malformed input yields none
    fn extract(&self, message: &HttpMessage) -> Vec<InjectionPoint>;

    /// Replace the value at `point`.
    ///
    /// `escaped` writes `value` verbatim; otherwise it is encoded for the
    /// location first.
    fn rebuild(
        &self,
        message: &mut HttpMessage,
        point: &InjectionPoint,
        value: &str,
        escaped: bool,
    ) -> Result<(), ScannerError>;
}

/// Builds the variant list from policy settings
pub struct VariantFactory;

impl VariantFactory {
    pub fn from_settings(settings: &PolicySettings) -> Vec<Arc<dyn Variant>> {
        let mut variants: Vec<Arc<dyn Variant>> = Vec::new();

        if settings.scan_query_params {
            variants.push(Arc::new(UrlQueryVariant));
        }
        if settings.scan_url_path {
            variants.push(Arc::new(UrlPathVariant));
        }
        if settings.scan_post_body {
            variants.push(Arc::new(FormBodyVariant));
        }
        if settings.scan_json {
            variants.push(Arc::new(JsonVariant));
        }
        if settings.scan_xml {
            variants.push(Arc::new(XmlVariant));
        }
        if settings.scan_cookies {
            variants.push(Arc::new(CookieVariant));
        }
        if settings.scan_headers {
            variants.push(Arc::new(HeaderVariant::new(settings.injectable_headers.clone())));
        }

        variants
    }
}

/// Replace `span` of `segment` after checking it still holds `point.raw_value`
pub(crate) fn splice(
    segment: &str,
    point: &InjectionPoint,
    replacement: &str,
) -> Result<String, ScannerError> {
    match segment.get(point.span.clone()) {
        Some(current) if current == point.raw_value => {
            let mut rebuilt = String::with_capacity(segment.len() + replacement.len());
            rebuilt.push_str(&segment[..point.span.start]);
            rebuilt.push_str(replacement);
            rebuilt.push_str(&segment[point.span.end..]);
            Ok(rebuilt)
        }
        _ => Err(rebuild_error(point, "message no longer matches the injection point")),
    }
}

pub(crate) fn rebuild_error(point: &InjectionPoint, reason: &str) -> ScannerError {
    ScannerError::Rebuild {
        location: point.kind.to_string(),
        name: point.name.clone(),
        reason: reason.to_string(),
    }
}

/// Value to write: the raw original when unchanged, otherwise `encode(value)`
pub(crate) fn replacement_for(
    point: &InjectionPoint,
    value: &str,
    escaped: bool,
    encode: impl FnOnce(&str) -> String,
) -> String {
    if escaped {
        value.to_string()
    } else if value == point.value {
        point.raw_value.clone()
    } else {
        encode(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_follows_settings() {
        let settings = PolicySettings::default();
        let kinds: Vec<_> = VariantFactory::from_settings(&settings)
            .iter()
            .map(|v| v.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                LocationKind::UrlQuery,
                LocationKind::BodyParam,
                LocationKind::JsonValue,
                LocationKind::XmlValue
            ]
        );

        let all = PolicySettings {
            scan_url_path: true,
            scan_headers: true,
            scan_cookies: true,
            ..PolicySettings::default()
        };
        assert_eq!(VariantFactory::from_settings(&all).len(), 7);
    }

    #[test]
    fn test_splice_rejects_stale_point() {
        let point = InjectionPoint {
            kind: LocationKind::UrlQuery,
            name: "q".into(),
            value: "a".into(),
            raw_value: "a".into(),
            span: 2..3,
            position: 0,
            segment: 0,
        };
        assert_eq!(splice("q=a&b=1", &point, "zz").unwrap(), "q=zz&b=1");
        assert!(splice("q=b&b=1", &point, "zz").is_err());
        assert!(splice("q", &point, "zz").is_err());
    }
}
