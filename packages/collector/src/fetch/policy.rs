//! Domain allow-list enforcement.
//!
//! Every navigation in every fetch strategy passes through the
//! policy before a request leaves the engine.

use url::Url;

use crate::error::PolicyViolation;

/// Allow-list over request hosts.
///
/// An empty list places no restriction; a non-empty list permits a
/// host only if it equals an entry or is a subdomain of one.
#[derive(Debug, Clone, Default)]
pub struct DomainPolicy {
    allowed_domains: Vec<String>,
}

impl DomainPolicy {
    pub fn new(allowed_domains: Vec<String>) -> Self {
        Self {
            allowed_domains: allowed_domains
                .into_iter()
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    /// A policy that permits every domain.
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_unrestricted(&self) -> bool {
        self.allowed_domains.is_empty()
    }

    /// Check a URL against the policy.
    pub fn check(&self, url: &str) -> Result<(), PolicyViolation> {
        let parsed = Url::parse(url)?;

        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(PolicyViolation::DisallowedScheme(other.to_string())),
        }

        let host = parsed
            .host_str()
            .ok_or(PolicyViolation::NoHost)?
            .to_lowercase();

        if self.allowed_domains.is_empty() {
            return Ok(());
        }

        for domain in &self.allowed_domains {
            if host == *domain || host.ends_with(&format!(".{domain}")) {
                return Ok(());
            }
        }

        Err(PolicyViolation::DomainNotAllowed { host })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_allows_everything() {
        let policy = DomainPolicy::allow_all();
        assert!(policy.check("https://anything.example.net/page").is_ok());
        assert!(policy.check("http://127.0.0.1:8080/api").is_ok());
    }

    #[test]
    fn test_exact_and_subdomain_match() {
        let policy = DomainPolicy::new(vec!["betfair.com".into()]);
        assert!(policy.check("https://betfair.com/markets").is_ok());
        assert!(policy.check("https://api.betfair.com/v1").is_ok());
        assert!(policy.check("https://BETFAIR.com/").is_ok());
    }

    #[test]
    fn test_rejects_other_hosts() {
        let policy = DomainPolicy::new(vec!["a.com".into()]);
        let err = policy.check("https://b.com/page").unwrap_err();
        assert!(matches!(err, PolicyViolation::DomainNotAllowed { host } if host == "b.com"));

        // Suffix tricks do not count as subdomains.
        assert!(policy.check("https://notreallya.com").is_err());
    }

    #[test]
    fn test_rejects_non_http_schemes() {
        let policy = DomainPolicy::allow_all();
        assert!(matches!(
            policy.check("file:///etc/passwd"),
            Err(PolicyViolation::DisallowedScheme(_))
        ));
        assert!(matches!(
            policy.check("ftp://example.com"),
            Err(PolicyViolation::DisallowedScheme(_))
        ));
    }

    #[test]
    fn test_rejects_unparseable_urls() {
        let policy = DomainPolicy::allow_all();
        assert!(matches!(
            policy.check("not a url"),
            Err(PolicyViolation::UrlParse(_))
        ));
    }
}
