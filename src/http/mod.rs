//! # HTTP Fan-out
//!
//! Concurrent outbound requests with per-key failure isolation.
//!
//! - [`request`] - request descriptors and the per-key [`Outcome`]
//! - [`transport`] - the [`HttpTransport`] seam and its `reqwest` implementation
//! - [`fanout`] - [`HttpFanoutClient`]

pub mod fanout;
pub mod request;
pub mod transport;

pub use fanout::HttpFanoutClient;
pub use request::{FanoutRequestSpec, HttpMethod, HttpResponse, Outcome};
pub use transport::{HttpTransport, ReqwestTransport};
