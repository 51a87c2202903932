//! Backend API client for the lockstep compliance agent.
//!
//! Every call is a JSON request/response with a bounded timeout and no
//! built-in retry; the caller owns retry policy. Transport and decoding
//! failures never escape this crate as errors. Each call resolves to an
//! [`Outcome`]:
//!
//! - `Success(T)`: the server answered and the answer decoded
//! - `Rejected(message)`: the server gave an authoritative "no"
//! - `Unknown(cause)`: nothing trustworthy was learned
//!
//! # Example
//!
//! ```
//! use lockstep_backend::{BackendConfig, HttpBackendClient};
//!
//! let config = BackendConfig {
//!     base_url: "http://127.0.0.1:8000".to_string(),
//!     ..Default::default()
//! };
//! let client = HttpBackendClient::new(config).unwrap();
//! assert_eq!(client.base_url(), "http://127.0.0.1:8000");
//! ```

mod client;
mod error;
mod http;
mod outcome;
pub mod testing;
pub mod wire;

pub use client::BackendClient;
pub use error::{BackendError, BackendResult};
pub use http::{local_ip, BackendConfig, HttpBackendClient};
pub use outcome::{FailureCause, Outcome};
pub use wire::{EnrollReply, EnrollRequest, LockNotice};
