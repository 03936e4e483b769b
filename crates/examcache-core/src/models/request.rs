use std::collections::BTreeMap;
use std::fmt;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// Header map with lowercase names.
pub type Headers = BTreeMap<String, String>;

/// What the requesting client intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// Full-page navigation
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    #[default]
    Empty,
}

/// An intercepted outbound request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// Plain GET with no particular destination (fetch/XHR)
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            destination: Destination::Empty,
            headers: Headers::new(),
            body: None,
        }
    }

    /// GET issued by a page navigation
    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_destination(Destination::Document)
    }

    /// POST with a JSON body
    pub fn post_json(url: Url, payload: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(payload)?;
        Ok(Self {
            method: Method::POST,
            url,
            destination: Destination::Empty,
            headers: Headers::new(),
            body: Some(body),
        }
        .with_header("content-type", "application/json"))
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    pub fn is_navigation(&self) -> bool {
        self.destination == Destination::Document
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::for_url(&self.url)
    }
}

/// Normalized request identity used to key cache entries.
///
/// Only GET requests are ever cached, so the key is the method plus the URL
/// with its fragment removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_url(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(format!("GET {}", url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The URL part of the key
    pub fn url(&self) -> &str {
        self.0.strip_prefix("GET ").unwrap_or(&self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
