//! # Ricochet - resilient HTTP request orchestration
//!
//! Ricochet turns one logical request into as many transport attempts as it
//! takes, within limits you set. It composes per-attempt and total timeouts
//! with caller cancellation, retries with exponential backoff (or whatever the
//! server asks for via `Retry-After`), refreshes credentials exactly once for
//! any number of concurrent callers, serves cached values while it
//! revalidates, and can keep polling in the background after the first
//! success. Every failure comes back as one of four error kinds.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ricochet::{CachePolicy, Client, RequestOptions, RetryConfig};
//! use http::Method;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .base_url("https://api.example.com")?
//!         .timeout(Duration::from_secs(5))
//!         .build()?;
//!
//!     // Poll a job until it is ready, at most 10 attempts.
//!     let options = RequestOptions::new(Method::GET)
//!         .retries(RetryConfig::times(10).retry_on(|ctx: &ricochet::RetryContext<'_>| {
//!             ctx.data
//!                 .and_then(|d| d.field("status"))
//!                 .is_some_and(|s| s == "pending")
//!         }))
//!         .cached(CachePolicy::for_duration(Duration::from_secs(60)));
//!
//!     match client.call("/jobs/42", options).await {
//!         Ok(response) => println!("job finished: {:?}", response.data),
//!         Err(failure) => eprintln!("{} failure: {}", failure.kind(), failure.error),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! A call returns `Result<Response, Failure>`. The [`Failure`] carries exactly
//! one [`Error`] and, when one was received, the raw response:
//!
//! ```no_run
//! use ricochet::{Client, Deadline, Error};
//!
//! # async fn example(client: Client) {
//! match client.get("/endpoint").await {
//!     Ok(response) => println!("Success: {:?}", response.data),
//!     Err(failure) => match &failure.error {
//!         Error::Http { status, body, .. } => eprintln!("HTTP {status}: {body:?}"),
//!         Error::Timeout { deadline: Deadline::Total, after } => {
//!             eprintln!("gave up after {after:?}")
//!         }
//!         other => eprintln!("{other}"),
//!     },
//! }
//! # }
//! ```

mod body;
pub mod cache;
mod client;
mod engine;
mod error;
mod hooks;
pub mod polling;
pub mod refresh;
mod request;
mod response;
pub mod retry;
mod scope;
pub mod target;
pub mod transport;

pub use body::{parse_body, ParseMode, Payload, RequestBody};
pub use cache::{CachePolicy, ResponseCache};
pub use client::{Client, ClientBuilder};
pub use error::{ConfigError, Deadline, Error, ErrorKind, Failure, Result};
pub use hooks::{ErrorMapper, RequestInfo, Validator};
pub use polling::PollConfig;
pub use request::RequestOptions;
pub use response::Response;
pub use retry::{RetryConfig, RetryContext, RetryPredicate};
pub use target::{Query, Resolvable, Target};
pub use transport::{RawResponse, Transport, TransportError, TransportRequest};
