//! # Quota Shared
//!
//! Wire types shared between the quota server and its HTTP clients.

pub mod dto;
pub mod response;

pub use response::ErrorResponse;
