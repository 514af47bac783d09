//! Canonical address rewriting and masquerading.

use tracing::debug;

use crate::address::parse::split_address;

/// Where an address came from; the oracle may qualify envelope and header
/// addresses differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteContext {
    Envelope,
    Header,
}

/// The external canonicalization oracle.
///
/// From the pipeline's perspective this is a pure function from address to
/// canonical `user@fully-qualified-domain` form.
pub trait Rewriter {
    fn rewrite(&self, context: RewriteContext, address: &str) -> String;
}

/// Built-in rewriter: qualifies bare local parts with the origin domain and
/// lowercases the domain part.
pub struct DomainRewriter {
    origin: String,
}

impl DomainRewriter {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
        }
    }
}

impl Rewriter for DomainRewriter {
    fn rewrite(&self, _context: RewriteContext, address: &str) -> String {
        let address = address.trim();
        if address.is_empty() {
            return String::new();
        }
        let (local, domain) = split_address(address);
        match domain {
            Some(domain) if !domain.is_empty() => {
                format!("{local}@{}", domain.to_ascii_lowercase())
            }
            // Bare local part or trailing '@': complete with the origin.
            _ => format!("{local}@{}", self.origin),
        }
    }
}

/// Run one address through the oracle. The returned flag reports whether a
/// change occurred; it feeds logging only, never control flow.
pub fn rewrite_address(
    rewriter: &dyn Rewriter,
    context: RewriteContext,
    address: &str,
) -> (String, bool) {
    let rewritten = rewriter.rewrite(context, address);
    let changed = rewritten != address;
    if changed {
        debug!(from = address, to = %rewritten, "Rewrote address");
    }
    (rewritten, changed)
}

/// Strip subdomain detail down to a configured domain boundary.
///
/// The first configured domain that the address's domain equals or sits
/// below wins; an address outside every boundary is returned unchanged.
pub fn masquerade(address: &str, domains: &[String]) -> String {
    let (local, Some(domain)) = split_address(address) else {
        return address.to_string();
    };
    for boundary in domains {
        if domain.eq_ignore_ascii_case(boundary) {
            return address.to_string();
        }
        let suffix = format!(".{boundary}");
        if domain.len() > suffix.len()
            && domain[domain.len() - suffix.len()..].eq_ignore_ascii_case(&suffix)
        {
            debug!(from = address, boundary = %boundary, "Masqueraded address");
            return format!("{local}@{boundary}");
        }
    }
    address.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_rewriter_qualifies_bare_local() {
        let rewriter = DomainRewriter::new("example.com");
        assert_eq!(
            rewriter.rewrite(RewriteContext::Envelope, "alice"),
            "alice@example.com"
        );
    }

    #[test]
    fn test_domain_rewriter_lowercases_domain() {
        let rewriter = DomainRewriter::new("example.com");
        assert_eq!(
            rewriter.rewrite(RewriteContext::Header, "Bob@Other.ORG"),
            "Bob@other.org"
        );
    }

    #[test]
    fn test_rewrite_address_reports_change() {
        let rewriter = DomainRewriter::new("example.com");
        let (_, changed) = rewrite_address(&rewriter, RewriteContext::Envelope, "alice");
        assert!(changed);
        let (_, changed) =
            rewrite_address(&rewriter, RewriteContext::Envelope, "alice@example.com");
        assert!(!changed);
    }

    #[test]
    fn test_masquerade_strips_subdomain() {
        let domains = vec!["example.com".to_string()];
        assert_eq!(
            masquerade("alice@mail.eu.example.com", &domains),
            "alice@example.com"
        );
    }

    #[test]
    fn test_masquerade_boundary_itself_unchanged() {
        let domains = vec!["example.com".to_string()];
        assert_eq!(masquerade("alice@example.com", &domains), "alice@example.com");
    }

    #[test]
    fn test_masquerade_foreign_domain_unchanged() {
        let domains = vec!["example.com".to_string()];
        assert_eq!(
            masquerade("alice@notexample.com", &domains),
            "alice@notexample.com"
        );
    }
}
