use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::rider::{DocRef, Rider};
use crate::models::task::{GeoPoint, Task, TaskStatus, TaskType};
use crate::observability::metrics::Metrics;
use crate::store::{DocumentStore, FieldWrite, Filter, WriteBatch};

/// Why the rider abandoned a pending task. `Other` carries free text and
/// must not be blank.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum CancelReason {
    StoreClosed,
    CustomerUnreachable,
    VehicleBreakdown,
    Other(String),
}

impl CancelReason {
    pub fn text(&self) -> Result<String, AppError> {
        match self {
            CancelReason::StoreClosed => Ok("Store closed".to_string()),
            CancelReason::CustomerUnreachable => Ok("Customer unreachable".to_string()),
            CancelReason::VehicleBreakdown => Ok("Vehicle breakdown".to_string()),
            CancelReason::Other(detail) => {
                let detail = detail.trim();
                if detail.is_empty() {
                    Err(AppError::BadRequest(
                        "a cancellation reason is required".to_string(),
                    ))
                } else {
                    Ok(detail.to_string())
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueItemView {
    /// 1-based display position in the rider's visiting order.
    pub position: usize,
    pub task_id: String,
    pub kind: TaskType,
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueView {
    pub tasks: Vec<QueueItemView>,
}

/// The rider's queue of not-yet-started tasks: loads the pending set
/// merged with the saved route order, reorders it in memory, persists the
/// order on request, and promotes or cancels entries.
pub struct PickupQueue {
    store: Arc<dyn DocumentStore>,
    metrics: Metrics,
    rider_id: String,
    tasks: Mutex<Vec<Task>>,
}

impl PickupQueue {
    pub fn new(store: Arc<dyn DocumentStore>, metrics: Metrics, rider_id: String) -> Self {
        Self {
            store,
            metrics,
            rider_id,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Idempotent view entry point: fetch the rider's `assigned` tasks and
    /// sort them by the saved route order. Ids not on the route trail in
    /// fetch order; stale route entries are tolerated.
    pub async fn initialize(&self) -> Result<QueueView, AppError> {
        let rider = self.fetch_rider().await?;
        let route = rider.manual_route_order;

        let docs = self
            .store
            .query(
                "tasks",
                &[
                    Filter::field_eq("riderId", self.rider_id.clone()),
                    Filter::field_eq("status", TaskStatus::Assigned.as_str()),
                ],
            )
            .await?;

        let mut tasks = docs
            .iter()
            .map(|doc| doc.parse::<Task>())
            .collect::<Result<Vec<_>, _>>()?;

        // stable: ties (ids off the route) keep fetch order
        tasks.sort_by_key(|task| {
            route
                .iter()
                .position(|id| *id == task.id)
                .unwrap_or(usize::MAX)
        });

        *self.lock() = tasks;
        self.metrics
            .view_inits_total
            .with_label_values(&["queue"])
            .inc();
        Ok(self.view())
    }

    pub fn view(&self) -> QueueView {
        let tasks = self
            .lock()
            .iter()
            .enumerate()
            .map(|(index, task)| QueueItemView {
                position: index + 1,
                task_id: task.id.clone(),
                kind: task.kind,
                name: display_name(task),
                address: display_address(task),
                phone: display_phone(task),
                location: display_location(task),
            })
            .collect();
        QueueView { tasks }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Reorder the in-memory queue. Nothing is persisted; the sequence
    /// must be a permutation of the loaded queue.
    pub fn reorder(&self, ordered_ids: &[String]) -> Result<QueueView, AppError> {
        {
            let mut tasks = self.lock();
            if ordered_ids.len() != tasks.len()
                || !tasks
                    .iter()
                    .all(|task| ordered_ids.iter().filter(|id| **id == task.id).count() == 1)
            {
                return Err(AppError::BadRequest(
                    "order must be a permutation of the current queue".to_string(),
                ));
            }
            tasks.sort_by_key(|task| {
                ordered_ids
                    .iter()
                    .position(|id| *id == task.id)
                    .unwrap_or(usize::MAX)
            });
        }
        Ok(self.view())
    }

    /// Persist the current in-memory sequence as the rider's route order,
    /// replacing whatever was saved before.
    pub async fn save_route(&self) -> Result<(), AppError> {
        let ids: Vec<String> = self.lock().iter().map(|task| task.id.clone()).collect();
        self.store
            .commit(WriteBatch::new().update(
                "riders",
                &self.rider_id,
                vec![("manual_route_order", FieldWrite::Set(json!(ids)))],
            ))
            .await?;
        self.metrics.route_saves_total.inc();
        info!(rider_id = %self.rider_id, stops = ids.len(), "route order saved");
        Ok(())
    }

    /// Promote a pending task to the rider's active task. Preconditions
    /// are re-checked against the live store: the rider must be idle, and
    /// the task must still be this rider's and still `assigned`. A stale
    /// cached view triggers a reload before the error is reported.
    pub async fn start(&self, task_id: &str) -> Result<(), AppError> {
        let rider = self.fetch_rider().await?;
        if rider.current_task.is_some() {
            return Err(AppError::TaskInFlight);
        }

        let fresh = match self.store.get("tasks", task_id).await? {
            Some(doc) => Some(doc.parse::<Task>()?),
            None => None,
        };
        let still_startable = fresh.as_ref().is_some_and(|task| {
            task.rider_id.as_deref() == Some(self.rider_id.as_str())
                && task.status == TaskStatus::Assigned
        });
        if !still_startable {
            warn!(task_id, "task no longer startable; reloading queue");
            self.initialize().await?;
            return Err(AppError::QueueOutOfDate);
        }

        // two separate writes; the narrow race between the check and the
        // first write is accepted
        self.store
            .commit(WriteBatch::new().update(
                "riders",
                &self.rider_id,
                vec![(
                    "current_task",
                    FieldWrite::Set(json!(DocRef::task(task_id))),
                )],
            ))
            .await?;
        self.store
            .commit(WriteBatch::new().update(
                "tasks",
                task_id,
                vec![(
                    "status",
                    FieldWrite::Set(json!(TaskStatus::InProgress.as_str())),
                )],
            ))
            .await?;

        self.metrics.tasks_started_total.inc();
        info!(task_id, rider_id = %self.rider_id, "task started");
        Ok(())
    }

    /// Cancel a pending task: one batch marks it `CANCELLED_BY_RIDER` with
    /// the reason and timestamp, and rewrites the rider's route order from
    /// its stored value with this id filtered out (never from the local
    /// copy, so concurrent edits are not clobbered). The in-memory queue
    /// is only touched after the commit succeeds.
    pub async fn cancel(&self, task_id: &str, reason: &CancelReason) -> Result<QueueView, AppError> {
        let reason_text = reason.text()?;

        let mut batch = WriteBatch::new().update(
            "tasks",
            task_id,
            vec![
                (
                    "status",
                    FieldWrite::Set(json!(TaskStatus::CancelledByRider.as_str())),
                ),
                ("cancellationReason", FieldWrite::Set(json!(reason_text))),
                ("cancelledAt", FieldWrite::ServerTimestamp),
            ],
        );

        match self.store.get("riders", &self.rider_id).await? {
            Some(doc) => {
                let rider = doc.parse::<Rider>()?;
                let route: Vec<String> = rider
                    .manual_route_order
                    .into_iter()
                    .filter(|id| id != task_id)
                    .collect();
                batch = batch.update(
                    "riders",
                    &self.rider_id,
                    vec![("manual_route_order", FieldWrite::Set(json!(route)))],
                );
            }
            None => {
                warn!(rider_id = %self.rider_id, "rider document missing; route order not updated");
            }
        }

        self.store.commit(batch).await?;

        self.lock().retain(|task| task.id != task_id);
        self.metrics.tasks_cancelled_total.inc();
        info!(task_id, reason = %reason_text, "task cancelled");
        Ok(self.view())
    }

    async fn fetch_rider(&self) -> Result<Rider, AppError> {
        self.store
            .get("riders", &self.rider_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("rider {}", self.rider_id)))?
            .parse::<Rider>()
            .map_err(AppError::from)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Task>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn display_name(task: &Task) -> String {
    match task.kind {
        TaskType::Pickup => task
            .pickup_name
            .clone()
            .unwrap_or_else(|| "Pickup Location".to_string()),
        TaskType::Delivery => task
            .customer_name
            .clone()
            .unwrap_or_else(|| "Customer".to_string()),
    }
}

fn display_address(task: &Task) -> String {
    match task.kind {
        TaskType::Pickup => task
            .pickup_address
            .clone()
            .or_else(|| task.customer_address.clone()),
        TaskType::Delivery => task.customer_address.clone(),
    }
    .unwrap_or_default()
}

fn display_phone(task: &Task) -> Option<String> {
    match task.kind {
        TaskType::Pickup => task.pickup_phone.clone(),
        TaskType::Delivery => task.customer_phone.clone(),
    }
}

fn display_location(task: &Task) -> Option<GeoPoint> {
    match task.kind {
        TaskType::Pickup => task
            .pickup_location
            .clone()
            .or_else(|| task.customer_location.clone()),
        TaskType::Delivery => task.customer_location.clone(),
    }
}
