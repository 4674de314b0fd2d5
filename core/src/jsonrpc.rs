//! Minimal JSON-RPC client over `HttpClient`.
//!
//! # Design
//! Method names are not declared up front: `JsonRpc::method` binds any name
//! to an `RpcMethod` handle, and `JsonRpc::call` invokes a name directly.
//! Ids start at 0 and are taken from an atomic counter, one per call.
//!
//! Failures keep their kind: `RpcError::Remote` for an `error` envelope,
//! `RpcError::Http` for a non-200 status, `RpcError::Fetch` for anything
//! the transport reported.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::agent::{Agent, ReqwestAgent};
use crate::client::HttpClient;
use crate::error::RpcError;
use crate::http::HttpMethod;
use crate::types::{RpcRequest, RpcResponse};

/// JSON-RPC client bound to one endpoint URL.
pub struct JsonRpc {
    url: String,
    next_id: AtomicU64,
    agent: Arc<dyn Agent>,
}

impl JsonRpc {
    pub fn new(url: impl Into<String>) -> Result<Self, RpcError> {
        Ok(Self::with_agent(url, Arc::new(ReqwestAgent::new()?)))
    }

    pub fn with_agent(url: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        Self {
            url: url.into(),
            next_id: AtomicU64::new(0),
            agent,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Id the next call will carry.
    pub fn next_id(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }

    /// Bind `name` as a remote method.
    pub fn method(&self, name: impl Into<String>) -> RpcMethod<'_> {
        RpcMethod {
            client: self,
            name: name.into(),
        }
    }

    /// Call `method` with positional `params` and return its `result`.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = serde_json::to_vec(&RpcRequest {
            method,
            params: &params,
            id,
        })
        .map_err(RpcError::Encode)?;

        debug!(url = %self.url, method, id, "rpc call");
        let response = HttpClient::builder(self.url.as_str())
            .method(HttpMethod::Post)
            .header("Content-Type", "application/json")
            .postdata(payload)
            .agent(Arc::clone(&self.agent))
            .build()?
            .fetch()
            .await?;

        if response.code != 200 {
            warn!(method, id, code = response.code, "rpc call rejected");
            return Err(RpcError::Http {
                code: response.code,
                message: response.phrase,
            });
        }

        let envelope: RpcResponse =
            serde_json::from_slice(&response.body).map_err(RpcError::Decode)?;
        match envelope.error.and_then(|error| error.into_message()) {
            Some(message) => {
                warn!(method, id, %message, "rpc call failed");
                Err(RpcError::Remote { message })
            }
            None => Ok(envelope.result),
        }
    }

    /// Like `call`, deserializing the result into `T`.
    pub async fn call_as<T>(&self, method: &str, params: Vec<Value>) -> Result<T, RpcError>
    where
        T: DeserializeOwned,
    {
        let result = self.call(method, params).await?;
        serde_json::from_value(result).map_err(RpcError::Decode)
    }
}

/// A remote method bound to its client.
pub struct RpcMethod<'a> {
    client: &'a JsonRpc,
    name: String,
}

impl RpcMethod<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn invoke(&self, params: Vec<Value>) -> Result<Value, RpcError> {
        self.client.call(&self.name, params).await
    }
}
