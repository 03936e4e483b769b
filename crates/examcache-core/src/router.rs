//! Request classification.
//!
//! Rules are evaluated in a fixed order: the network-first list, then the
//! cache-first list, then the stale-while-revalidate default. Within a list
//! the first matching fragment wins. Lists must not be reordered.

use std::fmt;

use reqwest::Method;

use crate::models::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    NetworkFirst,
    CacheFirst,
    StaleWhileRevalidate,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::NetworkFirst => "network-first",
            Strategy::CacheFirst => "cache-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted; the request goes to the network untouched
    Bypass,
    Handle(Strategy),
}

#[derive(Debug, Clone, Default)]
pub struct Router {
    network_first: Vec<String>,
    cache_first: Vec<String>,
}

impl Router {
    pub fn new(network_first: Vec<String>, cache_first: Vec<String>) -> Self {
        Self {
            network_first,
            cache_first,
        }
    }

    /// Pick the strategy for a URL. Pure: the same URL always yields the
    /// same strategy for a given rule set.
    pub fn classify(&self, url: &str) -> Strategy {
        if Self::matches(&self.network_first, url) {
            Strategy::NetworkFirst
        } else if Self::matches(&self.cache_first, url) {
            Strategy::CacheFirst
        } else {
            Strategy::StaleWhileRevalidate
        }
    }

    /// Only http(s) GETs are intercepted.
    pub fn route(&self, request: &Request) -> Route {
        if request.method != Method::GET || !request.is_http() {
            return Route::Bypass;
        }
        Route::Handle(self.classify(request.url.as_str()))
    }

    fn matches(patterns: &[String], url: &str) -> bool {
        patterns.iter().any(|pattern| url.contains(pattern.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn router() -> Router {
        Router::new(
            vec![
                "https://api.supabase.co".to_string(),
                "/api/".to_string(),
                "https://fonts.gstatic.com".to_string(),
            ],
            vec![
                "https://fonts.googleapis.com".to_string(),
                "https://unpkg.com".to_string(),
                "/icons/".to_string(),
                "/images/".to_string(),
            ],
        )
    }

    #[test]
    fn test_classify_network_first() {
        let r = router();
        assert_eq!(r.classify("https://api.supabase.co/rest/v1/exams"), Strategy::NetworkFirst);
        assert_eq!(r.classify("http://localhost:8080/api/exam-results"), Strategy::NetworkFirst);
        assert_eq!(r.classify("https://fonts.gstatic.com/s/sarabun.woff2"), Strategy::NetworkFirst);
    }

    #[test]
    fn test_classify_cache_first() {
        let r = router();
        assert_eq!(r.classify("https://unpkg.com/@supabase/supabase-js@2"), Strategy::CacheFirst);
        assert_eq!(r.classify("http://localhost:8080/icons/icon-192x192.png"), Strategy::CacheFirst);
        assert_eq!(r.classify("http://localhost:8080/images/logo.svg"), Strategy::CacheFirst);
    }

    #[test]
    fn test_classify_default() {
        let r = router();
        assert_eq!(r.classify("http://localhost:8080/index.html"), Strategy::StaleWhileRevalidate);
        assert_eq!(r.classify("http://localhost:8080/"), Strategy::StaleWhileRevalidate);
    }

    #[test]
    fn test_network_first_takes_precedence() {
        // Matches both lists; the network-first list is consulted first
        let r = router();
        assert_eq!(r.classify("http://localhost:8080/api/icons/list"), Strategy::NetworkFirst);
    }

    #[test]
    fn test_classify_is_stable() {
        let r = router();
        let url = "https://fonts.googleapis.com/css2?family=Sarabun";
        assert_eq!(r.classify(url), r.classify(url));
    }

    #[test]
    fn test_route_bypasses_non_get_and_non_http() {
        let r = router();
        let url = Url::parse("http://localhost:8080/api/exam-results").unwrap();

        let post = Request::post_json(url.clone(), &serde_json::json!({})).unwrap();
        assert_eq!(r.route(&post), Route::Bypass);

        let ext = Request::get(Url::parse("chrome-extension://abcdef/content.js").unwrap());
        assert_eq!(r.route(&ext), Route::Bypass);

        assert_eq!(r.route(&Request::get(url)), Route::Handle(Strategy::NetworkFirst));
    }

    #[test]
    fn test_empty_rules_default_everything() {
        let r = Router::default();
        assert_eq!(r.classify("https://unpkg.com/x"), Strategy::StaleWhileRevalidate);
    }
}
