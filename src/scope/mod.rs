//! Scope Management Module
//!
//! Controls which URLs the spider follows and the scanners touch.
//! Supports URL prefixes, domains, regexes and IP ranges.

use std::net::IpAddr;
use std::str::FromStr;

use regex::Regex;
use url::Url;

use crate::app::ScopeConfig;
use crate::error::ScopeError;

/// Include/exclude rules for one scan session
#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// Patterns that are in scope
    pub include: Vec<ScopePattern>,

    /// Patterns that are never in scope
    pub exclude: Vec<ScopePattern>,
}

impl Scope {
    /// Scope containing everything under one base URL
    pub fn for_target(url: &str) -> Result<Self, ScopeError> {
        Ok(Self {
            include: vec![ScopePattern::from_url(url)?],
            exclude: Vec::new(),
        })
    }

    /// Build from configured regexes.
    ///
    /// With no include patterns the target's origin is the scope; with
    /// neither, the scope accepts everything not excluded.
    pub fn from_config(config: &ScopeConfig, target: Option<&str>) -> Result<Self, ScopeError> {
        let mut include = config
            .include
            .iter()
            .map(|p| ScopePattern::regex(p))
            .collect::<Result<Vec<_>, _>>()?;
        let exclude = config
            .exclude
            .iter()
            .map(|p| ScopePattern::regex(p))
            .collect::<Result<Vec<_>, _>>()?;

        if include.is_empty() {
            if let Some(target) = target {
                include.push(ScopePattern::from_url(target)?);
            }
        }

        Ok(Self { include, exclude })
    }

    /// Add an include pattern
    pub fn add_include(&mut self, pattern: ScopePattern) {
        self.include.push(pattern);
    }

    /// Add an exclude pattern
    pub fn add_exclude(&mut self, pattern: ScopePattern) {
        self.exclude.push(pattern);
    }

    /// Check if a URL is in scope
    pub fn is_in_scope(&self, url: &Url) -> bool {
        if self.exclude.iter().any(|p| p.matches(url)) {
            return false;
        }

        self.include.is_empty() || self.include.iter().any(|p| p.matches(url))
    }

    /// Check a URL string; unparsable URLs are out of scope
    pub fn is_in_scope_str(&self, url: &str) -> bool {
        Url::parse(url).map(|u| self.is_in_scope(&u)).unwrap_or(false)
    }

    /// Get summary string
    pub fn summary(&self) -> String {
        format!(
            "{} include, {} exclude patterns",
            self.include.len(),
            self.exclude.len()
        )
    }
}

/// A pattern for matching URLs
#[derive(Debug, Clone)]
pub enum ScopePattern {
    /// Match URL prefix
    UrlPrefix(String),

    /// Match domain (with optional subdomain matching)
    Domain {
        domain: String,
        include_subdomains: bool,
    },

    /// Match using a compiled regex
    Regex(Regex),

    /// Match IP address or CIDR range
    IpRange { network: IpAddr, prefix_len: u8 },

    /// Match any path under a base URL (`scheme://host[:port]`, case-insensitive)
    BaseUrl(String),
}

impl ScopePattern {
    /// Base URL pattern covering everything on a URL's origin
    pub fn from_url(url: &str) -> Result<Self, ScopeError> {
        let parsed = Url::parse(url).map_err(|e| ScopeError::InvalidUrl(format!("{}: {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ScopeError::InvalidUrl(format!("{}: no host", url)))?;

        let base = match parsed.port() {
            Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
            None => format!("{}://{}", parsed.scheme(), host),
        };

        Ok(ScopePattern::BaseUrl(base.to_lowercase()))
    }

    /// Create a domain pattern
    pub fn domain(domain: &str, include_subdomains: bool) -> Self {
        ScopePattern::Domain {
            domain: domain.to_lowercase(),
            include_subdomains,
        }
    }

    /// Create a regex pattern
    pub fn regex(pattern: &str) -> Result<Self, ScopeError> {
        Regex::new(pattern)
            .map(ScopePattern::Regex)
            .map_err(|e| ScopeError::InvalidRegex(format!("{}: {}", pattern, e)))
    }

    /// Create an IP/CIDR pattern
    pub fn ip_range(cidr: &str) -> Result<Self, ScopeError> {
        let invalid = || ScopeError::InvalidCidr(cidr.to_string());

        let (address, prefix_len) = match cidr.split_once('/') {
            Some((address, len)) => (address, Some(len.parse::<u8>().map_err(|_| invalid())?)),
            None => (cidr, None),
        };

        let network = IpAddr::from_str(address).map_err(|_| invalid())?;
        let max_len = if network.is_ipv4() { 32 } else { 128 };
        let prefix_len = prefix_len.unwrap_or(max_len);
        if prefix_len > max_len {
            return Err(invalid());
        }

        Ok(ScopePattern::IpRange {
            network,
            prefix_len,
        })
    }

    /// Check if this pattern matches a URL
    pub fn matches(&self, url: &Url) -> bool {
        match self {
            ScopePattern::UrlPrefix(prefix) => url.as_str().starts_with(prefix.as_str()),

            ScopePattern::Domain {
                domain,
                include_subdomains,
            } => match url.host_str() {
                Some(host) => {
                    let host = host.to_lowercase();
                    host == *domain
                        || (*include_subdomains && host.ends_with(&format!(".{}", domain)))
                }
                None => false,
            },

            ScopePattern::Regex(re) => re.is_match(url.as_str()),

            ScopePattern::IpRange {
                network,
                prefix_len,
            } => match url.host() {
                Some(url::Host::Ipv4(ip)) => ip_in_range(IpAddr::V4(ip), *network, *prefix_len),
                Some(url::Host::Ipv6(ip)) => ip_in_range(IpAddr::V6(ip), *network, *prefix_len),
                _ => false,
            },

            ScopePattern::BaseUrl(base) => {
                let url = url.as_str().to_lowercase();
                url.starts_with(base.as_str())
                    && matches!(url.as_bytes().get(base.len()), None | Some(b'/' | b'?' | b'#'))
            }
        }
    }
}

fn ip_in_range(host: IpAddr, network: IpAddr, prefix_len: u8) -> bool {
    match (host, network) {
        (IpAddr::V4(host), IpAddr::V4(network)) => {
            let mask = if prefix_len == 0 {
                0
            } else {
                !0u32 << (32 - prefix_len)
            };
            (u32::from(host) & mask) == (u32::from(network) & mask)
        }
        (IpAddr::V6(host), IpAddr::V6(network)) => {
            let mask = if prefix_len == 0 {
                0
            } else {
                !0u128 << (128 - prefix_len)
            };
            (u128::from(host) & mask) == (u128::from(network) & mask)
        }
        _ => false,
    }
}
