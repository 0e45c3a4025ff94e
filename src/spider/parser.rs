//! Turns a fetched page into new crawl requests

use std::collections::HashSet;

use url::Url;

use super::robots::{is_robots_url, RobotsTxt};
use super::tags::{scan_tags, Tag};
use crate::http::HttpMessage;

/// Something the spider should fetch next
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CrawlRequest {
    Get(String),
    PostForm { url: String, body: String },
}

impl CrawlRequest {
    pub fn url(&self) -> &str {
        match self {
            CrawlRequest::Get(url) => url,
            CrawlRequest::PostForm { url, .. } => url,
        }
    }

    /// Build the message that performs this request
    pub fn to_message(&self) -> Result<HttpMessage, crate::error::HttpError> {
        match self {
            CrawlRequest::Get(url) => HttpMessage::get(url),
            CrawlRequest::PostForm { url, body } => HttpMessage::post_form(url, body),
        }
    }
}

/// Form handling switches
#[derive(Debug, Clone, Copy)]
pub struct ParserOptions {
    /// Submit GET forms
    pub submit_forms: bool,

    /// Also submit POST forms
    pub post_forms: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            submit_forms: true,
            post_forms: false,
        }
    }
}

/// Extract crawl requests from a response
pub fn parse_message(message: &HttpMessage, options: ParserOptions) -> Vec<CrawlRequest> {
    let page_url = match message.url() {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!(uri = %message.request.uri, error = %e, "Cannot resolve page URL");
            return Vec::new();
        }
    };

    let mut found = Vec::new();

    if let Some(location) = message.response.as_ref().filter(|r| r.is_redirect()).and_then(|r| r.header("location")) {
        if let Some(url) = resolve_link(&page_url, location) {
            found.push(CrawlRequest::Get(url));
        }
    }

    let body = message.response_body_text();

    if is_robots_url(&page_url) {
        found.extend(
            RobotsTxt::parse(&body)
                .candidate_urls(&page_url)
                .into_iter()
                .map(CrawlRequest::Get),
        );
        return dedup(found);
    }

    let scan = scan_tags(&body);
    let base = scan
        .base_href
        .as_deref()
        .and_then(|href| page_url.join(href).ok())
        .unwrap_or_else(|| page_url.clone());

    for anchor in &scan.anchors {
        if let Tag::Anchor { href, .. } = anchor {
            if let Some(url) = resolve_link(&base, href) {
                found.push(CrawlRequest::Get(url));
            }
        }
    }

    if options.submit_forms {
        for form in &scan.forms {
            let Tag::Form { action, method, .. } = &form.form else {
                continue;
            };
            let target = if action.trim().is_empty() {
                Some(strip_fragment(page_url.clone()))
            } else {
                resolve_link(&base, action)
            };
            let Some(target) = target else {
                continue;
            };

            let body = form
                .default_values()
                .iter()
                .map(|f| format!("{}={}", urlencoding::encode(&f.name), urlencoding::encode(&f.value)))
                .collect::<Vec<_>>()
                .join("&");

            if method.eq_ignore_ascii_case("post") {
                if options.post_forms {
                    found.push(CrawlRequest::PostForm { url: target, body });
                }
            } else if let Ok(mut url) = Url::parse(&target) {
                url.set_query(if body.is_empty() { None } else { Some(&body) });
                found.push(CrawlRequest::Get(url.to_string()));
            }
        }
    }

    dedup(found)
}

/// Resolve a link against a base, skipping non-navigational schemes
pub fn resolve_link(base: &Url, link: &str) -> Option<String> {
    let link = link.trim();
    if link.is_empty() || link.starts_with('#') {
        return None;
    }

    let lower = link.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let resolved = base.join(link).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    Some(strip_fragment(resolved))
}

fn strip_fragment(mut url: Url) -> String {
    url.set_fragment(None);
    url.to_string()
}

/// Drop repeats, keeping first occurrences in order
fn dedup(found: Vec<CrawlRequest>) -> Vec<CrawlRequest> {
    let mut seen = HashSet::with_capacity(found.len());
    found
        .into_iter()
        .filter(|request| seen.insert(request.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ResponseHeader;

    fn page(url: &str, html: &str) -> HttpMessage {
        let mut msg = HttpMessage::get(url).unwrap();
        msg.set_response(
            ResponseHeader::new(200, "OK").with_header("Content-Type", "text/html"),
            html.as_bytes().to_vec(),
        );
        msg
    }

    #[test]
    fn test_links_are_resolved() {
        let msg = page(
            "http://example.test/dir/page.html",
            r##"<a href="other.html#top">x</a>
               <a href="/root">y</a>
               <a href="#only-fragment">z</a>
               <a href="javascript:alert(1)">j</a>
               <a href="mailto:a@example.test">m</a>
               <a href="ftp://example.test/file">f</a>"##,
        );

        let found = parse_message(&msg, ParserOptions::default());
        assert_eq!(
            found,
            vec![
                CrawlRequest::Get("http://example.test/dir/other.html".into()),
                CrawlRequest::Get("http://example.test/root".into()),
            ]
        );
    }

    #[test]
    fn test_base_href_is_honoured() {
        let msg = page(
            "http://example.test/a/b",
            r#"<base href="/static/"><a href="x.html">x</a>"#,
        );
        let found = parse_message(&msg, ParserOptions::default());
        assert_eq!(found, vec![CrawlRequest::Get("http://example.test/static/x.html".into())]);
    }

    #[test]
    fn test_forms_use_default_values() {
        let msg = page(
            "http://example.test/",
            r#"<form action="/search"><input name="q" value="a b"><input type="submit"></form>
               <form action="/login" method="POST"><input name="user"><input type="password" name="pass"></form>"#,
        );

        let get_only = parse_message(&msg, ParserOptions::default());
        assert_eq!(get_only, vec![CrawlRequest::Get("http://example.test/search?q=a%20b".into())]);

        let with_post = parse_message(
            &msg,
            ParserOptions {
                submit_forms: true,
                post_forms: true,
            },
        );
        assert_eq!(with_post.len(), 2);
        assert_eq!(
            with_post[1],
            CrawlRequest::PostForm {
                url: "http://example.test/login".into(),
                body: "user=&pass=".into()
            }
        );
    }

    #[test]
    fn test_redirect_location() {
        let mut msg = HttpMessage::get("http://example.test/old").unwrap();
        msg.set_response(
            ResponseHeader::new(302, "Found").with_header("Location", "/new"),
            Vec::new(),
        );
        assert_eq!(
            parse_message(&msg, ParserOptions::default()),
            vec![CrawlRequest::Get("http://example.test/new".into())]
        );
    }

    #[test]
    fn test_robots_txt_is_parsed_specially() {
        let mut msg = HttpMessage::get("http://example.test/robots.txt").unwrap();
        msg.set_response(
            ResponseHeader::new(200, "OK").with_header("Content-Type", "text/plain"),
            b"User-agent: *\nDisallow: /secret/\n".to_vec(),
        );
        assert_eq!(
            parse_message(&msg, ParserOptions::default()),
            vec![CrawlRequest::Get("http://example.test/secret/".into())]
        );
    }

    #[test]
    fn test_repeated_links_keep_first_order() {
        let mut html = String::new();
        for i in 0..40_000 {
            html.push_str(&format!("<a href=/p{}>x</a><a href=/p{}>y</a>", i, i / 2));
        }
        let found = parse_message(&page("http://example.test/", &html), ParserOptions::default());

        assert_eq!(found.len(), 40_000);
        assert_eq!(found[0], CrawlRequest::Get("http://example.test/p0".into()));
        assert_eq!(found[1], CrawlRequest::Get("http://example.test/p1".into()));
        assert_eq!(found[39_999], CrawlRequest::Get("http://example.test/p39999".into()));
    }
}
