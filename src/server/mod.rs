//! Speed-test server collaborators: HTTP client and typed requests.

pub mod client;
pub mod requests;

pub use client::Client;
