//! Parse eligibility: which fetched responses are worth parsing for links

use crate::http::HttpMessage;

/// Responses above this many bytes are not parsed by default
pub const DEFAULT_MAX_PARSE_SIZE: usize = 512_000;

/// One reason to skip parsing a response
pub trait ParseFilter: Send + Sync {
    /// Filter name for diagnostics
    fn name(&self) -> &'static str;

    /// True when the response should not be parsed
    fn is_filtered(&self, message: &HttpMessage) -> bool;
}

/// Skips bodies larger than a ceiling
#[derive(Debug, Clone, Copy)]
pub struct MaxSizeFilter {
    pub max_size: usize,
}

impl ParseFilter for MaxSizeFilter {
    fn name(&self) -> &'static str {
        "max-size"
    }

    fn is_filtered(&self, message: &HttpMessage) -> bool {
        let size = message.response_body.len();
        if size > self.max_size {
            tracing::trace!(
                url = %message.request.uri,
                size,
                max = self.max_size,
                "Response too large to parse"
            );
            return true;
        }
        false
    }
}

/// Skips responses whose declared content type is not textual.
///
/// A missing content type counts as textual.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextContentFilter;

impl ParseFilter for TextContentFilter {
    fn name(&self) -> &'static str {
        "text-content"
    }

    fn is_filtered(&self, message: &HttpMessage) -> bool {
        let Some(response) = &message.response else {
            return false;
        };
        if response.is_text() {
            return false;
        }
        tracing::trace!(
            url = %message.request.uri,
            content_type = response.content_type().unwrap_or_default(),
            "Response is not text"
        );
        true
    }
}

/// Every filter a response must pass before it is parsed
pub struct ParseFilters {
    filters: Vec<Box<dyn ParseFilter>>,
}

impl ParseFilters {
    /// Size ceiling plus textual content type
    pub fn new(max_parse_size: usize) -> Self {
        Self {
            filters: vec![
                Box::new(MaxSizeFilter {
                    max_size: max_parse_size,
                }),
                Box::new(TextContentFilter),
            ],
        }
    }

    /// Register an additional filter
    pub fn push(&mut self, filter: Box<dyn ParseFilter>) {
        self.filters.push(filter);
    }

    /// True when any filter rejects the response
    pub fn is_filtered(&self, message: &HttpMessage) -> bool {
        self.filters.iter().any(|f| f.is_filtered(message))
    }

    /// Name of the first filter that rejects the response
    pub fn rejected_by(&self, message: &HttpMessage) -> Option<&'static str> {
        self.filters
            .iter()
            .find(|f| f.is_filtered(message))
            .map(|f| f.name())
    }
}

impl Default for ParseFilters {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PARSE_SIZE)
    }
}
