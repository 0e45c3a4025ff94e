//! Attribute extraction and tag recognition for link and form discovery
//!
//! Markup comes straight from the target and is untrusted, so everything here
//! is linear-time: tags and their attributes are located with forward scans
//! that never revisit input.

use std::collections::HashMap;

/// Attribute names and values of a tag fragment in document order.
///
/// Quoted values are consumed whole, so text inside them is never read as an
/// attribute. Scanning stops at a quote that is never closed; that attribute
/// gets no value.
fn attributes(fragment: &str) -> Vec<(&str, Option<&str>)> {
    let bytes = fragment.as_bytes();
    let skip_space = |mut i: usize| {
        while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
            i += 1;
        }
        i
    };

    let mut attrs = Vec::new();
    let mut i = 0;
    loop {
        i = skip_space(i);
        let Some(&b) = bytes.get(i) else {
            break;
        };

        // Stray quoted text or slashes between attributes
        if b == b'"' || b == b'\'' {
            match fragment[i + 1..].find(b as char) {
                Some(close) => i += close + 2,
                None => break,
            }
            continue;
        }
        if b == b'/' || b == b'=' {
            i += 1;
            continue;
        }

        let start = i;
        while bytes
            .get(i)
            .is_some_and(|c| !c.is_ascii_whitespace() && !matches!(*c, b'=' | b'/'))
        {
            i += 1;
        }
        let name = &fragment[start..i];

        let after_name = skip_space(i);
        if bytes.get(after_name) != Some(&b'=') {
            attrs.push((name, None));
            continue;
        }

        let value_start = skip_space(after_name + 1);
        match bytes.get(value_start) {
            None => {
                attrs.push((name, None));
                break;
            }
            Some(&q) if q == b'"' || q == b'\'' => {
                let Some(len) = fragment[value_start + 1..].find(q as char) else {
                    attrs.push((name, None));
                    break;
                };
                attrs.push((name, Some(&fragment[value_start + 1..value_start + 1 + len])));
                i = value_start + len + 2;
            }
            Some(_) => {
                let end = fragment[value_start..]
                    .find(|c: char| c.is_ascii_whitespace())
                    .map(|e| value_start + e)
                    .unwrap_or(fragment.len());
                attrs.push((name, Some(&fragment[value_start..end])));
                i = end;
            }
        }
    }
    attrs
}

/// Value of attribute `name` in a markup fragment, or an empty string.
///
/// The value is a double- or single-quoted string, or an unquoted run ending
/// at whitespace. An opening quote without its closing quote yields nothing.
/// The first occurrence of a repeated attribute wins.
pub fn extract_attribute(fragment: &str, name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }

    attributes(fragment)
        .into_iter()
        .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
        .and_then(|(_, value)| value)
        .unwrap_or_default()
        .to_string()
}

/// Whether a bare attribute such as `selected` or `disabled` is present
pub fn has_attribute(fragment: &str, name: &str) -> bool {
    !name.is_empty()
        && attributes(fragment)
            .iter()
            .any(|(attr, _)| attr.eq_ignore_ascii_case(name))
}

/// Element kinds the spider understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Anchor,
    Form,
    Input,
    Select,
    Option,
    TextArea,
}

impl TagKind {
    /// Recognize an element name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "a" => Some(TagKind::Anchor),
            "form" => Some(TagKind::Form),
            "input" => Some(TagKind::Input),
            "select" => Some(TagKind::Select),
            "option" => Some(TagKind::Option),
            "textarea" => Some(TagKind::TextArea),
            _ => None,
        }
    }
}

/// A recognized element with the attributes the spider needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Anchor {
        name: String,
        href: String,
    },
    Form {
        name: String,
        action: String,
        method: String,
    },
    Input {
        name: String,
        input_type: String,
        value: String,
    },
    Select {
        name: String,
    },
    Option {
        name: String,
        value: String,
        selected: bool,
    },
    TextArea {
        name: String,
    },
}

impl Tag {
    /// Build a tag from its attribute fragment; unknown attributes are ignored
    pub fn from_fragment(kind: TagKind, fragment: &str) -> Self {
        let attr = |name: &str| extract_attribute(fragment, name);

        match kind {
            TagKind::Anchor => Tag::Anchor {
                name: attr("name"),
                href: attr("href"),
            },
            TagKind::Form => Tag::Form {
                name: attr("name"),
                action: attr("action"),
                method: attr("method"),
            },
            TagKind::Input => Tag::Input {
                name: attr("name"),
                input_type: attr("type"),
                value: attr("value"),
            },
            TagKind::Select => Tag::Select { name: attr("name") },
            TagKind::Option => Tag::Option {
                name: attr("name"),
                value: attr("value"),
                selected: has_attribute(fragment, "selected"),
            },
            TagKind::TextArea => Tag::TextArea { name: attr("name") },
        }
    }

    /// The `name` attribute
    pub fn name(&self) -> &str {
        match self {
            Tag::Anchor { name, .. }
            | Tag::Form { name, .. }
            | Tag::Input { name, .. }
            | Tag::Select { name }
            | Tag::Option { name, .. }
            | Tag::TextArea { name } => name,
        }
    }

    pub fn kind(&self) -> TagKind {
        match self {
            Tag::Anchor { .. } => TagKind::Anchor,
            Tag::Form { .. } => TagKind::Form,
            Tag::Input { .. } => TagKind::Input,
            Tag::Select { .. } => TagKind::Select,
            Tag::Option { .. } => TagKind::Option,
            Tag::TextArea { .. } => TagKind::TextArea,
        }
    }
}

/// A submittable form field with its default value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

/// A form and the fields found before its closing tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormElement {
    /// The `<form>` tag
    pub form: Tag,

    /// Input, select and textarea tags in document order
    pub fields: Vec<Tag>,

    /// Options of each select, keyed by field index in `fields`
    pub options: HashMap<usize, Vec<Tag>>,
}

impl FormElement {
    fn new(form: Tag) -> Self {
        Self {
            form,
            fields: Vec::new(),
            options: HashMap::new(),
        }
    }

    /// Default submission values.
    ///
    /// Inputs carry their `value`, selects their selected (or first) option,
    /// text areas an empty string. Unnamed buttons and file inputs are left out.
    pub fn default_values(&self) -> Vec<FormField> {
        let mut values = Vec::new();

        for (index, field) in self.fields.iter().enumerate() {
            let name = field.name();
            if name.is_empty() {
                continue;
            }

            let value = match field {
                Tag::Input {
                    input_type, value, ..
                } => match input_type.to_ascii_lowercase().as_str() {
                    "file" | "image" => continue,
                    "checkbox" | "radio" if value.is_empty() => "on".to_string(),
                    _ => value.clone(),
                },
                Tag::Select { .. } => {
                    let options = self.options.get(&index).map(Vec::as_slice).unwrap_or(&[]);
                    options
                        .iter()
                        .find(|o| matches!(o, Tag::Option { selected: true, .. }))
                        .or_else(|| options.first())
                        .map(|o| match o {
                            Tag::Option { value, .. } => value.clone(),
                            _ => String::new(),
                        })
                        .unwrap_or_default()
                }
                _ => String::new(),
            };

            values.push(FormField {
                name: name.to_string(),
                value,
            });
        }

        values
    }
}

/// Tags found in one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupScan {
    /// `<base href>`, if declared
    pub base_href: Option<String>,

    /// Anchors in document order
    pub anchors: Vec<Tag>,

    /// Forms in document order
    pub forms: Vec<FormElement>,
}

/// Locate the recognized tags in a document with one forward pass.
///
/// Truncated markup yields whatever was complete before the cut.
pub fn scan_tags(html: &str) -> MarkupScan {
    let mut scan = MarkupScan::default();
    let bytes = html.as_bytes();
    let mut pos = 0;

    let mut open_form: Option<FormElement> = None;
    let mut open_select: Option<usize> = None;

    while let Some(offset) = html[pos..].find('<') {
        let start = pos + offset;

        if html[start..].starts_with("<!--") {
            pos = match html[start + 4..].find("-->") {
                Some(end) => start + 4 + end + 3,
                None => break,
            };
            continue;
        }

        let closing = bytes.get(start + 1) == Some(&b'/');
        let name_start = if closing { start + 2 } else { start + 1 };
        let name_end = html[name_start..]
            .find(|c: char| !c.is_ascii_alphanumeric())
            .map(|i| name_start + i)
            .unwrap_or(html.len());
        let name = &html[name_start..name_end];

        let Some(tag_end) = find_tag_end(html, name_end) else {
            break;
        };
        let fragment = html[name_end..tag_end].trim_end_matches('/');
        pos = tag_end + 1;

        if name.is_empty() {
            continue;
        }

        if closing {
            match name.to_ascii_lowercase().as_str() {
                "form" => {
                    if let Some(form) = open_form.take() {
                        scan.forms.push(form);
                    }
                    open_select = None;
                }
                "select" => open_select = None,
                _ => {}
            }
            continue;
        }

        if name.eq_ignore_ascii_case("base") {
            let href = extract_attribute(fragment, "href");
            if scan.base_href.is_none() && !href.is_empty() {
                scan.base_href = Some(href);
            }
            continue;
        }

        let Some(kind) = TagKind::from_name(name) else {
            continue;
        };

        let mut tag = Tag::from_fragment(kind, fragment);
        match kind {
            TagKind::Anchor => scan.anchors.push(tag),
            TagKind::Form => {
                // An unclosed form ends where the next one starts
                if let Some(previous) = open_form.replace(FormElement::new(tag)) {
                    scan.forms.push(previous);
                }
                open_select = None;
            }
            TagKind::Input | TagKind::TextArea | TagKind::Select => {
                if let Some(form) = open_form.as_mut() {
                    form.fields.push(tag);
                    open_select = (kind == TagKind::Select).then(|| form.fields.len() - 1);
                }
                if kind == TagKind::TextArea {
                    pos = skip_raw_text(html, pos, "</textarea");
                }
            }
            TagKind::Option => {
                if let (Some(form), Some(select)) = (open_form.as_mut(), open_select) {
                    if let Tag::Option { value, .. } = &mut tag {
                        if extract_attribute(fragment, "value").is_empty()
                            && !has_attribute(fragment, "value")
                        {
                            *value = option_text(html, pos);
                        }
                    }
                    form.options.entry(select).or_default().push(tag);
                }
            }
        }
    }

    if let Some(form) = open_form {
        scan.forms.push(form);
    }

    scan
}

/// Index of the `>` closing a tag, skipping quoted attribute values
fn find_tag_end(html: &str, from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in html.as_bytes()[from..].iter().enumerate() {
        match (quote, b) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, b'"') | (None, b'\'') => quote = Some(b),
            (None, b'>') => return Some(from + i),
            _ => {}
        }
    }
    None
}

/// Position of the closing tag of a raw-text element, matched without regard
/// to case; `closing` is lowercase
fn skip_raw_text(html: &str, from: usize, closing: &str) -> usize {
    let needle = closing.as_bytes();
    html.as_bytes()[from..]
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
        .map(|i| from + i)
        .unwrap_or(html.len())
}

/// Text content of an `<option>` up to the next tag
fn option_text(html: &str, from: usize) -> String {
    let end = html[from..].find('<').map(|i| from + i).unwrap_or(html.len());
    html[from..end].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_extract_quoted_and_unquoted() {
        assert_eq!(extract_attribute(r#" href="/a b""#, "href"), "/a b");
        assert_eq!(extract_attribute(" href='/single'", "href"), "/single");
        assert_eq!(extract_attribute(" href=/plain next=1", "href"), "/plain");
        assert_eq!(extract_attribute(" HREF = \"/spaced\"", "href"), "/spaced");
    }

    #[test]
    fn test_extract_spans_newlines() {
        let fragment = "\n  name=\"q\"\n  value=\"multi\nline\"";
        assert_eq!(extract_attribute(fragment, "value"), "multi\nline");
    }

    #[test]
    fn test_extract_requires_word_boundary() {
        assert_eq!(extract_attribute(r#" data-href="/x""#, "href"), "");
        assert_eq!(extract_attribute(r#" data-href="/x" href="/y""#, "href"), "/y");
    }

    #[test]
    fn test_extract_unclosed_quote_is_empty() {
        assert_eq!(extract_attribute(r#" href="/never-closed"#, "href"), "");
        assert_eq!(extract_attribute(r#" href='"#, "href"), "");
    }

    #[test]
    fn test_extract_absent_is_empty() {
        assert_eq!(extract_attribute(" class=x", "href"), "");
        assert_eq!(extract_attribute("", "href"), "");
        assert_eq!(extract_attribute(" href=x", ""), "");
    }

    #[test]
    fn test_extract_adversarial_input_terminates() {
        let fragment = format!(" href=\"{}", "a ".repeat(100_000));
        assert_eq!(extract_attribute(&fragment, "href"), "");
    }

    #[test]
    fn test_extract_skips_other_quoted_values() {
        assert_eq!(extract_attribute(r#" title="x href=evil""#, "href"), "");
        assert_eq!(extract_attribute(r#" title='a href="evil"' href="/real""#, "href"), "/real");
        assert_eq!(extract_attribute(r#" alt="name=bogus" name=real"#, "name"), "real");
        assert!(!has_attribute(r#" title="selected""#, "selected"));
        assert!(has_attribute(r#" title="x" selected"#, "selected"));
    }

    #[test]
    fn test_scan_ignores_attributes_inside_values() {
        let scan = scan_tags(r#"<a title="x href=evil">t</a><a data-x='href=/no' href="/yes">y</a>"#);
        let hrefs: Vec<_> = scan
            .anchors
            .iter()
            .map(|a| match a {
                Tag::Anchor { href, .. } => href.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(hrefs, vec!["", "/yes"]);
    }

    #[test]
    fn test_textarea_close_is_case_insensitive() {
        let html = r#"<form><textarea name=a><a href="/hidden"></TEXTAREA><a href="/shown">x</a></form>"#;
        let scan = scan_tags(html);
        assert_eq!(scan.anchors.len(), 1);
        assert_eq!(scan.forms[0].fields.len(), 1);
    }

    #[test]
    fn test_many_textareas_scan() {
        let html = format!("<form>{}</form>", "<textarea name=t>x</TEXTAREA>".repeat(40_000));
        let scan = scan_tags(&html);
        assert_eq!(scan.forms.len(), 1);
        assert_eq!(scan.forms[0].fields.len(), 40_000);
    }

    #[test]
    fn test_tags_from_fragments() {
        let form = Tag::from_fragment(TagKind::Form, r#" name="login" action="/auth" method=post"#);
        assert_eq!(
            form,
            Tag::Form {
                name: "login".into(),
                action: "/auth".into(),
                method: "post".into()
            }
        );

        let option = Tag::from_fragment(TagKind::Option, r#" value="2" selected"#);
        assert!(matches!(option, Tag::Option { selected: true, .. }));

        let anchor = Tag::from_fragment(TagKind::Anchor, r#" class="nav" href="/next""#);
        assert_eq!(anchor.name(), "");
        assert_eq!(anchor.kind(), TagKind::Anchor);
    }

    #[test]
    fn test_scan_groups_fields_under_forms() {
        let html = r#"
            <html><head><base href="http://example.test/app/"></head>
            <body>
            <a href="one.html">One</a>
            <!-- <a href="commented.html"> -->
            <form action="/search" method="get">
              <input type="text" name="q" value="default">
              <input type="submit" value="Go">
              <select name="sort"><option value="asc">Up<option value="desc" selected>Down</select>
              <textarea name="comment">ignored <a href="not-a-link"></textarea>
            </form>
            <a href='two.html'>Two</a>
            <input name="orphan">
            </body></html>
        "#;

        let scan = scan_tags(html);
        assert_eq!(scan.base_href.as_deref(), Some("http://example.test/app/"));
        assert_eq!(scan.anchors.len(), 2);
        assert_eq!(scan.forms.len(), 1);

        let form = &scan.forms[0];
        assert_eq!(form.fields.len(), 4);
        let values = form.default_values();
        assert_eq!(
            values,
            vec![
                FormField { name: "q".into(), value: "default".into() },
                FormField { name: "sort".into(), value: "desc".into() },
                FormField { name: "comment".into(), value: String::new() },
            ]
        );
    }

    #[test]
    fn test_option_text_used_without_value() {
        let html = "<form><select name=color><option>red<option>blue</select></form>";
        let scan = scan_tags(html);
        assert_eq!(
            scan.forms[0].default_values(),
            vec![FormField { name: "color".into(), value: "red".into() }]
        );
    }

    #[test]
    fn test_truncated_markup() {
        let scan = scan_tags(r#"<a href="/ok">ok</a><form action="/x"><input name="a"><a href="/cut"#);
        assert_eq!(scan.anchors.len(), 1);
        assert_eq!(scan.forms.len(), 1);
        assert_eq!(scan.forms[0].fields.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_quoted_value_round_trips(
            name in "[a-z]{1,8}",
            upper in any::<bool>(),
            value in "[^\"]{0,40}",
        ) {
            let written = if upper { name.to_uppercase() } else { name.clone() };
            let fragment = format!(" {}=\"{}\"", written, value);
            prop_assert_eq!(extract_attribute(&fragment, &name), value);
        }

        #[test]
        fn prop_single_quoted_value_round_trips(name in "[a-z]{1,8}", value in "[^']{0,40}") {
            let fragment = format!(" {}='{}'", name, value);
            prop_assert_eq!(extract_attribute(&fragment, &name), value);
        }

        #[test]
        fn prop_missing_attribute_is_empty(fragment in "[^=]{0,80}") {
            prop_assert_eq!(extract_attribute(&fragment, "href"), "");
        }

        #[test]
        fn prop_scan_never_panics(html in ".{0,300}") {
            let _ = scan_tags(&html);
        }
    }
}
