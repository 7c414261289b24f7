//! ipfetch-http: HTTP semantics for the ipfetch request layer
//!
//! Request validation and fingerprinting, response directive parsing, the
//! store-time expiry and freshness rules, and the retry policy.

pub mod cache_control;
pub mod fingerprint;
pub mod freshness;
pub mod policy;
pub mod request;
pub mod response;
pub mod retry;
pub mod status;

pub use cache_control::{CacheControl, ResponseDirectives, parse_http_date};
pub use fingerprint::{DEFAULT_VARY_HEADERS, Fingerprinter, normalize_url};
pub use freshness::evaluate;
pub use policy::{ExpiryPolicy, is_cacheable, method_is_cacheable};
pub use request::{PreparedRequest, Request};
pub use response::{CacheStatus, Response, TransportResponse, header_map, header_pairs};
pub use retry::{DEFAULT_RETRY_STATUSES, Outcome, RetryPolicy};
pub use status::{ERROR_BODY_LIMIT, error_for_status, parse_retry_after};
