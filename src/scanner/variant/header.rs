use super::{rebuild_error, replacement_for, splice, InjectionPoint, LocationKind, Variant};
use crate::error::ScannerError;
use crate::http::HttpMessage;

/// Whole values of allow-listed request headers
pub struct HeaderVariant {
    names: Vec<String>,
}

impl HeaderVariant {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    fn is_injectable(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}

impl Variant for HeaderVariant {
    fn kind(&self) -> LocationKind {
        LocationKind::Header
    }

    fn extract(&self, message: &HttpMessage) -> Vec<InjectionPoint> {
        message
            .request
            .headers
            .iter()
            .enumerate()
            .filter(|(_, (name, _))| self.is_injectable(name))
            .enumerate()
            .map(|(position, (index, (name, value)))| InjectionPoint {
                kind: LocationKind::Header,
                name: name.clone(),
                value: value.clone(),
                raw_value: value.clone(),
                span: 0..value.len(),
                position,
                segment: index,
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
        let header = message
            .request
            .headers
            .get_mut(point.segment)
            .filter(|(name, _)| name.eq_ignore_ascii_case(&point.name))
            .ok_or_else(|| rebuild_error(point, "header is gone"))?;

        // Line breaks would split the header
        let replacement =
            replacement_for(point, value, escaped, |v| v.replace(['\r', '\n'], ""));
        header.1 = splice(&header.1, point, &replacement)?;
        Ok(())
    }
}
