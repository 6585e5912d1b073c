//! Outbound HTTP to the booking REST API.

mod client;

pub use client::{ApiClient, Auth, ClientError};
