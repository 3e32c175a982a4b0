use serde::{Deserialize, Serialize};

/// Reference to a document in another collection, stored inline the way
/// the rider document points at its current task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocRef {
    pub collection: String,
    pub id: String,
}

impl DocRef {
    pub fn task(id: impl Into<String>) -> Self {
        Self {
            collection: "tasks".to_string(),
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiderAccount {
    /// Undeposited cash collected on delivery. Grows on COD completions,
    /// zeroed by a deposit.
    #[serde(default)]
    pub cod_balance: f64,
}

/// The authenticated delivery agent, as stored in the `riders` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rider {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// At most one task in flight at a time.
    #[serde(default)]
    pub current_task: Option<DocRef>,
    /// Rider-chosen visiting order for pending tasks. Entries may be
    /// stale; ids not in the current queue are tolerated.
    #[serde(default)]
    pub manual_route_order: Vec<String>,
    #[serde(default)]
    pub account: RiderAccount,
}
