use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::order::OrderStatus;
use crate::models::task::{Task, TaskStatus, TaskType};

/// Lifecycle actions a rider can take on the active task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    ReachedPickup,
    PickedUp,
    ReachedDrop,
    Delivered,
    DeliveredCod,
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskAction::ReachedPickup => "reached_pickup",
            TaskAction::PickedUp => "picked_up",
            TaskAction::ReachedDrop => "reached_drop",
            TaskAction::Delivered => "delivered",
            TaskAction::DeliveredCod => "delivered_cod",
        }
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single action offered for a task's `(type, status)` pair, if any.
/// Terminal tasks offer nothing.
pub fn offered_action(task: &Task) -> Option<TaskAction> {
    match task.status {
        TaskStatus::Assigned | TaskStatus::InProgress | TaskStatus::Verified => {
            Some(TaskAction::ReachedPickup)
        }
        TaskStatus::ArrivedPickup => Some(TaskAction::PickedUp),
        TaskStatus::PickedUp => Some(TaskAction::ReachedDrop),
        TaskStatus::ArrivedDrop => match task.kind {
            TaskType::Delivery if task.is_paid => Some(TaskAction::Delivered),
            TaskType::Delivery => Some(TaskAction::DeliveredCod),
            TaskType::Pickup => Some(TaskAction::Delivered),
        },
        TaskStatus::Completed | TaskStatus::CancelledByRider => None,
    }
}

/// The label shown on the offered control.
pub fn action_label(task: &Task, action: TaskAction) -> &'static str {
    match action {
        TaskAction::ReachedPickup => "Reached Pickup",
        TaskAction::PickedUp => "Confirm Pickup",
        TaskAction::ReachedDrop => "Reached Drop",
        TaskAction::Delivered => match task.kind {
            TaskType::Delivery => "Mark Delivered (Paid)",
            TaskType::Pickup => "Confirm Dropoff (Store)",
        },
        TaskAction::DeliveredCod => "Collect Cash & Mark Delivered",
    }
}

/// Everything a committed transition changes, planned ahead of the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub task_status: TaskStatus,
    /// Companion order-status update; `None` skips the order write entirely.
    pub order_status: Option<OrderStatus>,
    /// Terminal transition: stamps `completedAt`, clears the rider's
    /// current-task link and the order's rider assignment.
    pub completes: bool,
    /// Delivery completions also stamp `completedAt` on the order.
    pub stamp_order_completed: bool,
}

/// Plan the commit for an action. Returns `None` unless the action is the
/// one currently offered, which is what makes stale or duplicate
/// submissions harmless.
pub fn plan(task: &Task, action: TaskAction) -> Option<Transition> {
    if offered_action(task) != Some(action) {
        return None;
    }

    let transition = match action {
        TaskAction::ReachedPickup => Transition {
            task_status: TaskStatus::ArrivedPickup,
            order_status: Some(OrderStatus::RiderAtPickup),
            completes: false,
            stamp_order_completed: false,
        },
        TaskAction::PickedUp => Transition {
            task_status: TaskStatus::PickedUp,
            order_status: match task.kind {
                TaskType::Delivery => Some(OrderStatus::OutForDelivery),
                TaskType::Pickup => None,
            },
            completes: false,
            stamp_order_completed: false,
        },
        TaskAction::ReachedDrop => Transition {
            task_status: TaskStatus::ArrivedDrop,
            order_status: Some(match task.kind {
                TaskType::Pickup => OrderStatus::ArrivedAtStore,
                TaskType::Delivery => OrderStatus::ArrivedAtCustomer,
            }),
            completes: false,
            stamp_order_completed: false,
        },
        TaskAction::Delivered | TaskAction::DeliveredCod => Transition {
            task_status: TaskStatus::Completed,
            order_status: Some(match task.kind {
                TaskType::Pickup => OrderStatus::PickupDone,
                TaskType::Delivery => OrderStatus::Delivered,
            }),
            completes: true,
            stamp_order_completed: task.kind == TaskType::Delivery,
        },
    };

    Some(transition)
}

/// Cash to add to the rider's COD balance for this action. Non-zero only
/// for an unpaid delivery completed via `delivered_cod` with a positive
/// total; the task leaves `arrived_drop` irreversibly, so it cannot accrue
/// twice.
pub fn cod_accrual(task: &Task, action: TaskAction) -> f64 {
    if action == TaskAction::DeliveredCod
        && task.kind == TaskType::Delivery
        && !task.is_paid
        && task.total > 0.0
    {
        task.total
    } else {
        0.0
    }
}
