//! Randomized outbound request identity.
//!
//! Each request picks a user agent from a fixed pool of current desktop
//! browsers so that consecutive attempts do not share an identical
//! fingerprint. The rotator holds no state: the caller supplies the RNG.

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, USER_AGENT};

/// Desktop browser user agents used for rotation.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// The header set sent with one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub user_agent: &'static str,
    pub accept: &'static str,
    pub accept_language: &'static str,
}

impl RequestIdentity {
    /// Same identity with a different `Accept` header.
    pub fn with_accept(mut self, accept: &'static str) -> Self {
        self.accept = accept;
        self
    }

    pub fn header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(self.user_agent));
        headers.insert(ACCEPT, HeaderValue::from_static(self.accept));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(self.accept_language));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers
    }
}

/// Picks a [`RequestIdentity`] from a fixed user-agent pool.
#[derive(Debug, Clone, Copy)]
pub struct HeaderRotator {
    pool: &'static [&'static str],
}

impl HeaderRotator {
    /// Rotator over a custom pool. An empty pool falls back to [`USER_AGENTS`].
    pub const fn new(pool: &'static [&'static str]) -> Self {
        if pool.is_empty() {
            Self { pool: USER_AGENTS }
        } else {
            Self { pool }
        }
    }

    pub fn pool(&self) -> &'static [&'static str] {
        self.pool
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> RequestIdentity {
        let user_agent = self.pool.choose(rng).copied().unwrap_or(USER_AGENTS[0]);
        RequestIdentity {
            user_agent,
            accept: "*/*",
            accept_language: "en-US,en;q=0.9",
        }
    }
}

impl Default for HeaderRotator {
    fn default() -> Self {
        Self::new(USER_AGENTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn same_seed_same_identity() {
        let rotator = HeaderRotator::default();
        let a: Vec<_> = {
            let mut rng = StdRng::seed_from_u64(7);
            (0..10).map(|_| rotator.pick(&mut rng)).collect()
        };
        let b: Vec<_> = {
            let mut rng = StdRng::seed_from_u64(7);
            (0..10).map(|_| rotator.pick(&mut rng)).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn picks_only_from_pool_and_covers_it() {
        let rotator = HeaderRotator::default();
        let mut rng = StdRng::seed_from_u64(42);
        let seen: HashSet<&str> = (0..200).map(|_| rotator.pick(&mut rng).user_agent).collect();
        assert!(seen.iter().all(|ua| USER_AGENTS.contains(ua)));
        assert_eq!(seen.len(), USER_AGENTS.len());
    }

    #[test]
    fn empty_pool_uses_default() {
        let rotator = HeaderRotator::new(&[]);
        assert_eq!(rotator.pool().len(), USER_AGENTS.len());
    }

    #[test]
    fn header_map_carries_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        let identity = HeaderRotator::default().pick(&mut rng).with_accept("application/json");
        let headers = identity.header_map();
        assert_eq!(headers.get(USER_AGENT).unwrap(), identity.user_agent);
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
    }
}
