//! Request fingerprinting

use http::HeaderName;
use ipfetch_core::Fingerprint;
use sha2::{Digest, Sha256};
use url::Url;

use crate::PreparedRequest;

/// Headers that vary responses by default
pub const DEFAULT_VARY_HEADERS: &[&str] = &["accept", "accept-language"];

/// Normalize a URL for identity purposes
///
/// Scheme and host are lowercased and default ports dropped by the parser;
/// the fragment is removed and query pairs are sorted so parameter order
/// does not matter.
pub fn normalize_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        pairs.sort();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    url.to_string()
}

/// Derives cache keys from prepared requests
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    vary: Vec<HeaderName>,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(DEFAULT_VARY_HEADERS.iter().copied())
    }
}

impl Fingerprinter {
    /// Create with the header names that participate in identity
    ///
    /// Invalid names are skipped; order and case do not matter.
    pub fn new<I, S>(vary: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vary: Vec<HeaderName> = vary
            .into_iter()
            .filter_map(|name| HeaderName::from_bytes(name.as_ref().trim().as_bytes()).ok())
            .collect();
        vary.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        vary.dedup();
        Self { vary }
    }

    /// Header names in identity order
    pub fn vary_headers(&self) -> &[HeaderName] {
        &self.vary
    }

    /// Compute the fingerprint of a request
    pub fn fingerprint(&self, request: &PreparedRequest) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(request.method.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(normalize_url(&request.url).as_bytes());
        hasher.update(b"\n");

        for name in &self.vary {
            let values: Vec<&[u8]> = request
                .headers
                .get_all(name)
                .iter()
                .map(|v| v.as_bytes())
                .collect();
            if values.is_empty() {
                continue;
            }
            hasher.update(name.as_str().as_bytes());
            hasher.update(b":");
            hasher.update(values.join(&b","[..]));
            hasher.update(b"\n");
        }

        if let Some(body) = request.body.as_ref().filter(|b| !b.is_empty()) {
            hasher.update(b"body:");
            hasher.update(Sha256::digest(body));
        }

        Fingerprint::from_hex(hex::encode(hasher.finalize()))
    }
}
