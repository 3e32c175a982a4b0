use std::fmt;

use serde::{Deserialize, Serialize};

/// Customer-facing order statuses this service writes as a side effect of
/// task transitions. Orders are owned elsewhere; only `status`,
/// `assignedRiderId`, `assignedRiderName` and `completedAt` are touched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    RiderAtPickup,
    OutForDelivery,
    ArrivedAtCustomer,
    ArrivedAtStore,
    Delivered,
    PickupDone,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::RiderAtPickup => "RIDER_AT_PICKUP",
            OrderStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            OrderStatus::ArrivedAtCustomer => "ARRIVED_AT_CUSTOMER",
            OrderStatus::ArrivedAtStore => "ARRIVED_AT_STORE",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::PickupDone => "PICKUP_DONE",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
