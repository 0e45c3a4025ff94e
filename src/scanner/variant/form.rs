use super::params::{decode_component, encode_component, split_params, with_separator};
use super::{rebuild_error, replacement_for, splice, InjectionPoint, LocationKind, Variant};
use crate::error::ScannerError;
use crate::http::HttpMessage;

/// Parameters of a `application/x-www-form-urlencoded` body
pub struct FormBodyVariant;

impl Variant for FormBodyVariant {
    fn kind(&self) -> LocationKind {
        LocationKind::BodyParam
    }

    fn extract(&self, message: &HttpMessage) -> Vec<InjectionPoint> {
        if !message.request.is_form_urlencoded() || message.request_body.is_empty() {
            return Vec::new();
        }

        let Ok(body) = std::str::from_utf8(&message.request_body) else {
            tracing::debug!(url = %message.url_string(), "Form body is not UTF-8");
            return Vec::new();
        };

        split_params(body, 0)
            .into_iter()
            .enumerate()
            .map(|(position, param)| InjectionPoint {
                kind: LocationKind::BodyParam,
                name: decode_component(param.name),
                value: decode_component(param.value),
                raw_value: param.value.to_string(),
                span: param.value_span,
                position,
                segment: 0,
            })
            .collect()
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
        let replacement = replacement_for(point, value, escaped, encode_component);
        let replacement = with_separator(body, point, replacement);
        let rebuilt = splice(body, point, &replacement)?;
        message.set_request_body(rebuilt.into_bytes());
        Ok(())
    }
}
