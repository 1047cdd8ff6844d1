//! Request bodies shared by the REST surface and its clients.
//!
//! Every mutation names the actor making it. Authentication is out of scope, so the server takes the actor at its
//! word and leaves the permission checks to the lifecycle rules.
use serde::{Deserialize, Serialize};

use crate::db_types::{Actor, DisputeResolution, OrderStatusType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorParams {
    #[serde(flatten)]
    pub actor: Actor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionParams {
    #[serde(flatten)]
    pub actor: Actor,
    pub status: OrderStatusType,
    /// Reject the change if the order has moved on from this version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelParams {
    #[serde(flatten)]
    pub actor: Actor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowLockParams {
    #[serde(flatten)]
    pub actor: Actor,
    pub tx_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escrow_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisputeParams {
    #[serde(flatten)]
    pub actor: Actor,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveDisputeParams {
    #[serde(flatten)]
    pub actor: Actor,
    pub resolution: DisputeResolution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionRequestParams {
    #[serde(flatten)]
    pub actor: Actor,
    pub minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionResponseParams {
    #[serde(flatten)]
    pub actor: Actor,
    pub accept: bool,
}
