//! `name=value&name=value` grammar shared by the query and form variants

use std::borrow::Cow;
use std::ops::Range;

use super::InjectionPoint;

/// One parameter pair with byte ranges relative to the parsed string
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawParam<'a> {
    pub name: &'a str,
    pub value: &'a str,
    pub value_span: Range<usize>,
}

/// Split on `&`, then on the first `=`.
///
/// A pair without `=` has an empty value positioned after its name; empty
/// pairs are skipped.
pub(crate) fn split_params(input: &str, offset: usize) -> Vec<RawParam<'_>> {
    let mut params = Vec::new();
    let mut start = 0;

    for pair in input.split('&') {
        let pair_start = start;
        start += pair.len() + 1;

        if pair.is_empty() {
            continue;
        }

        let (name, value, value_start) = match pair.find('=') {
            Some(eq) => (&pair[..eq], &pair[eq + 1..], pair_start + eq + 1),
            None => (pair, "", pair_start + pair.len()),
        };

        params.push(RawParam {
            name,
            value,
            value_span: offset + value_start..offset + value_start + value.len(),
        });
    }

    params
}

/// Decode a form/query component (`+` is a space)
pub(crate) fn decode_component(raw: &str) -> String {
    let spaced: Cow<'_, str> = if raw.contains('+') {
        Cow::Owned(raw.replace('+', " "))
    } else {
        Cow::Borrowed(raw)
    };
    percent_decode(&spaced)
}

/// Percent-decode, keeping invalid UTF-8 as replacement characters
pub(crate) fn percent_decode(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned(),
    }
}

pub(crate) fn encode_component(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// A pair written without `=` gains one once it is given a value
pub(crate) fn with_separator(segment: &str, point: &InjectionPoint, replacement: String) -> String {
    let separated = segment
        .get(..point.span.start)
        .is_some_and(|head| head.ends_with('='));
    if separated || replacement.is_empty() {
        replacement
    } else {
        format!("={}", replacement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_params() {
        let params = split_params("a=1&&b&c=x=y&=v", 0);
        let pairs: Vec<_> = params.iter().map(|p| (p.name, p.value)).collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", ""), ("c", "x=y"), ("", "v")]);

        assert_eq!(params[0].value_span, 2..3);
        assert_eq!(params[1].value_span, 6..6);
        assert_eq!(params[2].value_span, 9..12);
    }

    #[test]
    fn test_offset_is_applied() {
        let params = split_params("q=1", 10);
        assert_eq!(params[0].value_span, 12..13);
    }

    #[test]
    fn test_decoding() {
        assert_eq!(decode_component("a+b%20c"), "a b c");
        assert_eq!(decode_component("%E2%9C%93"), "\u{2713}");
        assert_eq!(decode_component("%FF"), "\u{FFFD}");
        assert_eq!(encode_component("x y"), "x%20y");
    }
}
