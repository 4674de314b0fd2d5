//! Asynchronous HTTP client, JSON-RPC client and text escaping helpers.
//!
//! # Overview
//! `HttpClient` issues a request through a pluggable transport `Agent`,
//! streams the response body into a `BodyReceiver` and returns a fully
//! materialized `Response`, optionally following redirects. `JsonRpc`
//! performs JSON-RPC calls on top of it. `escape` holds the stateless
//! HTML/URL/JSON helpers and `linkify`.
//!
//! # Design
//! - The transport is injected (`Arc<dyn Agent>`), defaulting to
//!   `ReqwestAgent`; tests substitute scripted agents.
//! - Redirects are a bounded loop, never recursion.
//! - JSON-RPC failures are split into remote, HTTP-status and transport
//!   errors so callers can branch on the kind.

pub mod agent;
pub mod body;
pub mod client;
pub mod error;
pub mod escape;
pub mod http;
pub mod jsonrpc;
pub mod types;

pub use agent::{Agent, AgentResponse, ReqwestAgent};
pub use body::{BodyProducer, BodyReceiver};
pub use client::{fetch, HttpClient, HttpClientBuilder, DEFAULT_MAX_REDIRECTS};
pub use error::{EscapeError, FetchError, RpcError};
pub use http::{Headers, HttpMethod, ProxyEndpoint, Response};
pub use jsonrpc::{JsonRpc, RpcMethod};
pub use types::{RpcErrorBody, RpcRequest, RpcResponse};
