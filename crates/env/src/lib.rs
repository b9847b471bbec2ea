//! Simulator clients for GridParley.
//!
//! The grid world runs as a separate process; [`HttpEnvironment`] speaks its
//! JSON-over-HTTP protocol and implements `gridparley_core::Environment`.

pub mod http;

pub use http::HttpEnvironment;
