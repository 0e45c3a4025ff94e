use super::params::{encode_component, percent_decode};
use super::{replacement_for, splice, InjectionPoint, LocationKind, Variant};
use crate::error::ScannerError;
use crate::http::HttpMessage;

/// Non-empty segments of the URL path, named by their index
pub struct UrlPathVariant;

impl Variant for UrlPathVariant {
    fn kind(&self) -> LocationKind {
        LocationKind::UrlPath
    }

    fn extract(&self, message: &HttpMessage) -> Vec<InjectionPoint> {
        let request = &message.request;
        if !request.is_uri_well_formed() {
            tracing::debug!(uri = %request.uri, "Skipping path segments of malformed URI");
            return Vec::new();
        }

        let range = request.path_range();
        let path = &request.uri[range.clone()];
        let mut points = Vec::new();
        let mut offset = range.start;

        for (index, segment) in path.split('/').enumerate() {
            let start = offset;
            offset += segment.len() + 1;

            if segment.is_empty() {
                continue;
            }

            points.push(InjectionPoint {
                kind: LocationKind::UrlPath,
                name: index.to_string(),
                value: percent_decode(segment),
                raw_value: segment.to_string(),
                span: start..start + segment.len(),
                position: points.len(),
                segment: 0,
            });
        }

        points
    }

    fn rebuild(
        &self,
        message: &mut HttpMessage,
        point: &InjectionPoint,
        value: &str,
        escaped: bool,
    ) -> Result<(), ScannerError> {
        let replacement = replacement_for(point, value, escaped, encode_component);
        message.request.uri = splice(&message.request.uri, point, &replacement)?;
        Ok(())
    }
}
