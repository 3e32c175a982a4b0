use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskType {
    Pickup,
    #[default]
    Delivery,
}

/// Lifecycle states of a task. The first three are all "en route to
/// pickup"; they differ only in how the task got there (fresh assignment,
/// started from the queue, or verified by a call to the contact).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Assigned,
    InProgress,
    Verified,
    ArrivedPickup,
    PickedUp,
    ArrivedDrop,
    Completed,
    #[serde(rename = "CANCELLED_BY_RIDER")]
    CancelledByRider,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Verified => "verified",
            TaskStatus::ArrivedPickup => "arrived_pickup",
            TaskStatus::PickedUp => "picked_up",
            TaskStatus::ArrivedDrop => "arrived_drop",
            TaskStatus::Completed => "completed",
            TaskStatus::CancelledByRider => "CANCELLED_BY_RIDER",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::CancelledByRider)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// One pickup-or-delivery unit of work, as stored in the `tasks`
/// collection. The document id lives outside the stored fields and is
/// injected on parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: TaskType,
    pub status: TaskStatus,
    #[serde(default)]
    pub rider_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub pickup_name: Option<String>,
    #[serde(default)]
    pub pickup_address: Option<String>,
    #[serde(default)]
    pub pickup_phone: Option<String>,
    #[serde(default)]
    pub pickup_location: Option<GeoPoint>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_address: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_location: Option<GeoPoint>,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
}
