//! Request and response snapshots passed between the router, the executors
//! and the cache stores.

pub mod request;
pub mod response;

pub use request::{CacheKey, Destination, Headers, Request};
pub use response::Response;
