//! # Reqwest HTTP Bridge
//!
//! [`HttpClient`](bridge_traits::HttpClient) implementation backed by
//! reqwest, for native hosts. This is the only crate in the workspace that
//! touches a concrete HTTP stack.

pub mod http;

pub use http::ReqwestHttpClient;
