//! robots.txt as a source of crawl seeds
//!
//! Both allowed and disallowed paths are interesting to a security crawl, so
//! every concrete path is returned regardless of user agent group.

/// Paths and sitemaps declared in a robots.txt body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsTxt {
    /// `Allow` and `Disallow` paths in file order, wildcards trimmed
    pub paths: Vec<String>,

    /// Absolute `Sitemap` URLs
    pub sitemaps: Vec<String>,
}

impl RobotsTxt {
    pub fn parse(body: &str) -> Self {
        let mut robots = RobotsTxt::default();

        for line in body.lines() {
            let line = match line.find('#') {
                Some(i) => &line[..i],
                None => line,
            };
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            match directive.trim().to_ascii_lowercase().as_str() {
                "allow" | "disallow" => {
                    // Keep the literal prefix before any pattern syntax
                    let path = value.split(['*', '$']).next().unwrap_or_default();
                    if path.starts_with('/') && !robots.paths.iter().any(|p| p == path) {
                        robots.paths.push(path.to_string());
                    }
                }
                "sitemap" => robots.sitemaps.push(value.to_string()),
                _ => {}
            }
        }

        robots
    }

    /// Candidate URLs resolved against the robots.txt location
    pub fn candidate_urls(&self, robots_url: &url::Url) -> Vec<String> {
        self.paths
            .iter()
            .chain(self.sitemaps.iter())
            .filter_map(|p| robots_url.join(p).ok())
            .map(|u| u.to_string())
            .collect()
    }
}

/// Whether a URL points at a site's robots.txt
pub fn is_robots_url(url: &url::Url) -> bool {
    url.path() == "/robots.txt"
}
