//! State and side-input requests made by a stage mid-bundle.

use crate::core::BoundedWindow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies the state cell or side-input a request targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateKey {
    /// Keyed user state of a transform, scoped to a window.
    UserState {
        /// Transform owning the state.
        transform_id: String,
        /// Encoded user key.
        user_key: Vec<u8>,
        /// Window the state belongs to.
        window: BoundedWindow,
    },
    /// A side input of a transform, materialized for a window.
    SideInput {
        /// Transform reading the side input.
        transform_id: String,
        /// Side input id local to the transform.
        side_input_id: String,
        /// Window the side input is read for.
        window: BoundedWindow,
    },
}

impl StateKey {
    /// Returns the transform the key belongs to.
    #[must_use]
    pub fn transform_id(&self) -> &str {
        match self {
            Self::UserState { transform_id, .. } | Self::SideInput { transform_id, .. } => {
                transform_id
            }
        }
    }
}

/// The operation a state request performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum StateRequestKind {
    /// Read the current contents.
    Get,
    /// Append encoded bytes.
    Append(Vec<u8>),
    /// Clear the contents.
    Clear,
}

impl fmt::Display for StateRequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "get"),
            Self::Append(_) => write!(f, "append"),
            Self::Clear => write!(f, "clear"),
        }
    }
}

/// A request from the executor for state or side-input data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRequest {
    /// Request id, echoed in the response.
    pub id: String,
    /// Target of the request.
    pub key: StateKey,
    /// Operation.
    pub kind: StateRequestKind,
}

/// The answer to a [`StateRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateResponse {
    /// Id of the request answered.
    pub id: String,
    /// Encoded data for `Get`, empty otherwise.
    #[serde(default)]
    pub data: Vec<u8>,
}

impl StateResponse {
    /// An acknowledgement carrying no data.
    #[must_use]
    pub fn ack(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: Vec::new(),
        }
    }
}

/// Serves a stage's state and side-input requests during one bundle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateRequestHandler: Send + Sync {
    /// Handles one request.
    async fn handle(&self, request: StateRequest) -> anyhow::Result<StateResponse>;
}

/// Rejects every request; for stages without state or side inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedStateHandler;

#[async_trait]
impl StateRequestHandler for UnsupportedStateHandler {
    async fn handle(&self, request: StateRequest) -> anyhow::Result<StateResponse> {
        anyhow::bail!(
            "state request '{}' ({} on transform '{}') is not supported by this stage",
            request.id,
            request.kind,
            request.key.transform_id()
        )
    }
}
