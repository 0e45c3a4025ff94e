use super::params::{encode_component, percent_decode};
use super::{rebuild_error, replacement_for, splice, InjectionPoint, LocationKind, Variant};
use crate::error::ScannerError;
use crate::http::HttpMessage;

/// Values of the `Cookie` request header(s)
pub struct CookieVariant;

impl Variant for CookieVariant {
    fn kind(&self) -> LocationKind {
        LocationKind::Cookie
    }

    fn extract(&self, message: &HttpMessage) -> Vec<InjectionPoint> {
        let mut points = Vec::new();

        for (index, (name, value)) in message.request.headers.iter().enumerate() {
            if !name.eq_ignore_ascii_case("cookie") {
                continue;
            }

            let mut start = 0;
            for pair in value.split(';') {
                let pair_start = start;
                start += pair.len() + 1;

                let trimmed = pair.trim_start();
                let lead = pair.len() - trimmed.len();
                let Some(eq) = trimmed.find('=') else {
                    continue;
                };

                let raw = trimmed[eq + 1..].trim_end();
                let value_start = pair_start + lead + eq + 1;
                points.push(InjectionPoint {
                    kind: LocationKind::Cookie,
                    name: trimmed[..eq].trim().to_string(),
                    value: percent_decode(raw),
                    raw_value: raw.to_string(),
                    span: value_start..value_start + raw.len(),
                    position: points.len(),
                    segment: index,
                });
            }
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
        let header = message
            .request
            .headers
            .get_mut(point.segment)
            .filter(|(name, _)| name.eq_ignore_ascii_case("cookie"))
            .ok_or_else(|| rebuild_error(point, "cookie header is gone"))?;

        let replacement = replacement_for(point, value, escaped, encode_component);
        header.1 = splice(&header.1, point, &replacement)?;
        Ok(())
    }
}
