use super::params::{decode_component, encode_component, split_params, with_separator};
use super::{replacement_for, splice, InjectionPoint, LocationKind, Variant};
use crate::error::ScannerError;
use crate::http::HttpMessage;

/// Parameters of the URL query string
pub struct UrlQueryVariant;

impl Variant for UrlQueryVariant {
    fn kind(&self) -> LocationKind {
        LocationKind::UrlQuery
    }

    fn extract(&self, message: &HttpMessage) -> Vec<InjectionPoint> {
        let request = &message.request;
        if !request.is_uri_well_formed() {
            tracing::debug!(uri = %request.uri, "Skipping query parameters of malformed URI");
            return Vec::new();
        }

        let Some(range) = request.query_range() else {
            return Vec::new();
        };

        split_params(&request.uri[range.clone()], range.start)
            .into_iter()
            .enumerate()
            .map(|(position, param)| InjectionPoint {
                kind: LocationKind::UrlQuery,
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
        let replacement = replacement_for(point, value, escaped, encode_component);
        let replacement = with_separator(&message.request.uri, point, replacement);
        message.request.uri = splice(&message.request.uri, point, &replacement)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn message(uri: &str) -> HttpMessage {
        HttpMessage::get(uri).unwrap()
    }

    #[test]
    fn test_extract_query_points() {
        let msg = message("http://example.test/search?q=test&page=2");
        let points = UrlQueryVariant.extract(&msg);

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].name, "q");
        assert_eq!(points[0].value, "test");
        assert_eq!(points[1].name, "page");
        assert_eq!(points[1].position, 1);
        assert_eq!(&msg.request.uri[points[1].span.clone()], "2");
    }

    #[test]
    fn test_rebuild_encodes_unescaped_value() {
        let mut msg = message("http://example.test/search?q=test&page=2");
        let points = UrlQueryVariant.extract(&msg);

        UrlQueryVariant.rebuild(&mut msg, &points[0], "x y", false).unwrap();
        assert_eq!(msg.request.uri, "http://example.test/search?q=x%20y&page=2");
    }

    #[test]
    fn test_rebuild_escaped_is_verbatim() {
        let mut msg = message("http://example.test/?a=1&b=2");
        let points = UrlQueryVariant.extract(&msg);

        UrlQueryVariant.rebuild(&mut msg, &points[1], "<x>", true).unwrap();
        assert_eq!(msg.request.uri, "http://example.test/?a=1&b=<x>");
    }

    #[test]
    fn test_decoded_names_and_values() {
        let msg = message("http://example.test/?first+name=J%C3%B6rg+M&flag");
        let points = UrlQueryVariant.extract(&msg);

        assert_eq!(points[0].name, "first name");
        assert_eq!(points[0].value, "Jörg M");
        assert_eq!(points[0].raw_value, "J%C3%B6rg+M");
        assert_eq!(points[1].name, "flag");
        assert_eq!(points[1].value, "");
    }

    #[test]
    fn test_valueless_param_gains_separator() {
        let mut msg = message("http://example.test/?flag&a=1");
        let points = UrlQueryVariant.extract(&msg);

        UrlQueryVariant.rebuild(&mut msg, &points[0], "on", false).unwrap();
        assert_eq!(msg.request.uri, "http://example.test/?flag=on&a=1");
        assert_eq!(UrlQueryVariant.extract(&msg)[0].value, "on");
    }

    #[test]
    fn test_fragment_is_not_part_of_query() {
        let msg = message("http://example.test/?a=1#frag");
        let points = UrlQueryVariant.extract(&msg);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].raw_value, "1");
    }

    #[test]
    fn test_malformed_uri_has_no_points() {
        let mut msg = message("http://example.test/?a=1");
        msg.request.uri = "http://exa mple/?a=1".to_string();
        assert!(UrlQueryVariant.extract(&msg).is_empty());
    }

    proptest! {
        #[test]
        fn prop_rebuild_with_own_value_is_identity(
            params in prop::collection::vec(("[a-z]{1,6}", "[a-zA-Z0-9%+._-]{0,8}"), 1..5)
        ) {
            let query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            let uri = format!("http://example.test/p?{}", query.join("&"));
            let original = message(&uri);

            for point in UrlQueryVariant.extract(&original) {
                let mut unescaped = original.clone();
                UrlQueryVariant.rebuild(&mut unescaped, &point, &point.value, false).unwrap();
                prop_assert_eq!(&unescaped.request.uri, &original.request.uri);

                let mut escaped = original.clone();
                UrlQueryVariant.rebuild(&mut escaped, &point, &point.raw_value, true).unwrap();
                prop_assert_eq!(&escaped.request.uri, &original.request.uri);
            }
        }
    }
}
