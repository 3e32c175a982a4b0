use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::engine::machine::{self, TaskAction};
use crate::engine::subscription::{Generation, SubscriptionSlot};
use crate::error::AppError;
use crate::models::rider::Rider;
use crate::models::task::{GeoPoint, Task, TaskStatus, TaskType};
use crate::observability::metrics::Metrics;
use crate::store::{DocumentStore, FieldWrite, Snapshot, WriteBatch};

/// Which leg of the task the rider is currently travelling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopLeg {
    Pickup,
    Drop,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopView {
    pub leg: StopLeg,
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub location: Option<GeoPoint>,
    pub call_label: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    PaidOnline,
    CashOnDelivery,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentView {
    pub method: PaymentMethod,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionView {
    pub action: TaskAction,
    pub label: &'static str,
    /// Cleared while a commit is in flight so the control cannot fire twice.
    pub enabled: bool,
}

/// Render instruction for the active task. A pure function of the task
/// document plus the in-flight flag; no markup, data only.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveTaskView {
    pub task_id: String,
    pub order_id: Option<String>,
    /// Short display handle, `#` plus the first characters of the order id.
    pub order_label: String,
    pub kind: TaskType,
    pub status: TaskStatus,
    pub stop: StopView,
    pub payment: Option<PaymentView>,
    pub action: Option<ActionView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HomeView {
    /// Nothing in flight; also the degraded state after a feed error.
    NoTask,
    Active(ActiveTaskView),
}

impl ActiveTaskView {
    pub fn from_task(task: &Task, busy: bool) -> Self {
        let on_pickup_leg = matches!(
            task.status,
            TaskStatus::Assigned
                | TaskStatus::InProgress
                | TaskStatus::Verified
                | TaskStatus::ArrivedPickup
        );

        let stop = if on_pickup_leg {
            StopView {
                leg: StopLeg::Pickup,
                name: task
                    .pickup_name
                    .clone()
                    .unwrap_or_else(|| "Pickup Location".to_string()),
                address: task.pickup_address.clone().unwrap_or_default(),
                phone: task.pickup_phone.clone(),
                location: task.pickup_location.clone(),
                call_label: match task.kind {
                    TaskType::Delivery => "Call Store",
                    TaskType::Pickup => "Call Customer",
                },
            }
        } else {
            StopView {
                leg: StopLeg::Drop,
                name: task
                    .customer_name
                    .clone()
                    .unwrap_or_else(|| "Dropoff Location".to_string()),
                address: task.customer_address.clone().unwrap_or_default(),
                phone: task.customer_phone.clone(),
                location: task.customer_location.clone(),
                call_label: match task.kind {
                    TaskType::Pickup => "Call Store",
                    TaskType::Delivery => "Call Customer",
                },
            }
        };

        let payment = (task.status == TaskStatus::ArrivedDrop && task.kind == TaskType::Delivery)
            .then(|| PaymentView {
                method: if task.is_paid {
                    PaymentMethod::PaidOnline
                } else {
                    PaymentMethod::CashOnDelivery
                },
                amount: task.total,
            });

        let action = machine::offered_action(task).map(|action| ActionView {
            action,
            label: machine::action_label(task, action),
            enabled: !busy,
        });

        let label_source = task.order_id.as_deref().unwrap_or(&task.id);
        let order_label: String =
            std::iter::once('#').chain(label_source.chars().take(5)).collect();

        Self {
            task_id: task.id.clone(),
            order_id: task.order_id.clone(),
            order_label,
            kind: task.kind,
            status: task.status,
            stop,
            payment,
            action,
        }
    }
}

/// Result of a dispatched action: the view to render next, plus a
/// completion notice when the task just finished.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub view: HomeView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<CompletionNotice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionNotice {
    pub cod_collected: f64,
}

/// Owns the active-task view: one rider-document feed, one nested
/// task-document feed driven by the rider's `current_task` reference, and
/// the transition commits. The store stays authoritative; the cached task
/// here is only the last snapshot seen.
pub struct ProgressionController {
    store: Arc<dyn DocumentStore>,
    metrics: Metrics,
    rider_id: String,
    generation: Generation,
    /// Stamped per task-feed attachment; a second guard under the same
    /// generation, since the rider feed re-targets the task feed.
    task_epoch: Generation,
    rider_slot: SubscriptionSlot,
    task_slot: SubscriptionSlot,
    current: Mutex<Option<Task>>,
    busy: AtomicBool,
    view_tx: watch::Sender<HomeView>,
}

impl ProgressionController {
    pub fn new(store: Arc<dyn DocumentStore>, metrics: Metrics, rider_id: String) -> Arc<Self> {
        let (view_tx, _) = watch::channel(HomeView::NoTask);
        Arc::new(Self {
            store,
            metrics,
            rider_id,
            generation: Generation::new(),
            task_epoch: Generation::new(),
            rider_slot: SubscriptionSlot::new(),
            task_slot: SubscriptionSlot::new(),
            current: Mutex::new(None),
            busy: AtomicBool::new(false),
            view_tx,
        })
    }

    /// Idempotent view entry point: tears down both feeds and re-attaches
    /// the rider feed. Calling it twice leaves exactly one rider feed.
    pub fn initialize(self: Arc<Self>) {
        let generation = self.generation.advance();
        self.task_slot.clear();
        self.rider_slot.clear();
        self.publish(None);

        info!(rider_id = %self.rider_id, "attaching rider feed");
        let rx = self.store.subscribe("riders", &self.rider_id);
        let controller = Arc::clone(&self);
        self.rider_slot
            .arm(tokio::spawn(async move {
                controller.watch_rider(generation, rx).await;
            }));
        self.metrics.view_inits_total.with_label_values(&["home"]).inc();
    }

    /// Current render instruction.
    pub fn view(&self) -> HomeView {
        self.view_tx.borrow().clone()
    }

    /// Live stream of render instructions.
    pub fn subscribe_view(&self) -> watch::Receiver<HomeView> {
        self.view_tx.subscribe()
    }

    async fn watch_rider(self: Arc<Self>, generation: u64, mut rx: watch::Receiver<Snapshot>) {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if !self.generation.is_current(generation) {
                return;
            }
            Self::on_rider_snapshot(&self, generation, snapshot);
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn on_rider_snapshot(this: &Arc<Self>, generation: u64, snapshot: Snapshot) {
        // a watcher aborted mid-delivery must not touch the slots that now
        // belong to its replacement
        if !this.generation.is_current(generation) {
            return;
        }

        // whatever the rider document says now supersedes the old task feed
        this.task_slot.clear();

        let task_ref = match snapshot {
            Ok(Some(doc)) => match doc.parse::<Rider>() {
                Ok(rider) => rider.current_task,
                Err(err) => {
                    warn!(error = %err, "rider document unreadable");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "rider feed failed");
                None
            }
        };

        match task_ref {
            Some(task_ref) => {
                debug!(task_id = %task_ref.id, "attaching task feed");
                let epoch = this.task_epoch.advance();
                let rx = this.store.subscribe(&task_ref.collection, &task_ref.id);
                if !this.generation.is_current(generation) {
                    return;
                }
                let controller = Arc::clone(this);
                this.task_slot.arm(tokio::spawn(async move {
                    controller.watch_task(generation, epoch, rx).await;
                }));
            }
            None => this.publish(None),
        }
    }

    async fn watch_task(
        self: Arc<Self>,
        generation: u64,
        epoch: u64,
        mut rx: watch::Receiver<Snapshot>,
    ) {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if !self.generation.is_current(generation) || !self.task_epoch.is_current(epoch) {
                return;
            }
            self.on_task_snapshot(snapshot);
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn on_task_snapshot(&self, snapshot: Snapshot) {
        match snapshot {
            Ok(Some(doc)) => match doc.parse::<Task>() {
                Ok(task) => {
                    debug!(task_id = %task.id, status = %task.status, "task snapshot");
                    self.publish(Some(task));
                }
                Err(err) => {
                    warn!(error = %err, "task document unreadable");
                    self.publish(None);
                }
            },
            Ok(None) => self.publish(None),
            Err(err) => {
                warn!(error = %err, "task feed failed");
                self.publish(None);
            }
        }
    }

    fn publish(&self, task: Option<Task>) {
        let view = match &task {
            Some(task) => {
                HomeView::Active(ActiveTaskView::from_task(task, self.busy.load(Ordering::SeqCst)))
            }
            None => HomeView::NoTask,
        };
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = task;
        self.view_tx.send_replace(view);
    }

    /// Re-render the cached task under the current busy flag.
    fn republish(&self) {
        let task = self.cached_task();
        self.publish(task);
    }

    fn cached_task(&self) -> Option<Task> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Dispatch a lifecycle action against the active task. Exactly one
    /// commit may be in flight; the batch applies task, order and rider
    /// updates all-or-nothing, and failure leaves the cached task as it was.
    /// The view in the outcome is rendered after the busy gate reopens, so
    /// a successful response offers the next action enabled.
    pub async fn perform_action(&self, action: TaskAction) -> Result<ActionOutcome, AppError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(AppError::UpdateInFlight);
        }

        let result = self.commit_action(action).await;
        self.busy.store(false, Ordering::SeqCst);
        // re-render now that the gate is open; this also repairs any view
        // a snapshot published while the commit was in flight
        self.republish();

        let outcome_label = if result.is_ok() { "success" } else { "error" };
        self.metrics
            .transitions_total
            .with_label_values(&[action.as_str(), outcome_label])
            .inc();

        let completed = result?;
        Ok(ActionOutcome {
            view: self.view(),
            completed,
        })
    }

    async fn commit_action(&self, action: TaskAction) -> Result<Option<CompletionNotice>, AppError> {
        let task = self.cached_task().ok_or(AppError::NoActiveTask)?;

        let transition = machine::plan(&task, action).ok_or(AppError::ActionUnavailable {
            action,
            status: task.status,
        })?;

        let order_id = task
            .order_id
            .clone()
            .ok_or_else(|| AppError::MissingOrderLink(task.id.clone()))?;

        let mut task_fields = vec![(
            "status",
            FieldWrite::Set(json!(transition.task_status.as_str())),
        )];
        if transition.completes {
            task_fields.push(("completedAt", FieldWrite::ServerTimestamp));
        }
        let mut batch = WriteBatch::new().update("tasks", &task.id, task_fields);

        if let Some(order_status) = transition.order_status {
            let mut order_fields = vec![(
                "status",
                FieldWrite::Set(json!(order_status.as_str())),
            )];
            if transition.completes {
                order_fields.push(("assignedRiderId", FieldWrite::Set(Value::Null)));
                order_fields.push(("assignedRiderName", FieldWrite::Set(Value::Null)));
            }
            if transition.stamp_order_completed {
                order_fields.push(("completedAt", FieldWrite::ServerTimestamp));
            }
            batch = batch.update("orders", &order_id, order_fields);
        }

        let cod = machine::cod_accrual(&task, action);
        if transition.completes {
            let mut rider_fields = vec![("current_task", FieldWrite::Set(Value::Null))];
            if cod > 0.0 {
                rider_fields.push(("account.cod_balance", FieldWrite::Increment(cod)));
            }
            batch = batch.update("riders", &self.rider_id, rider_fields);
        }

        self.store.commit(batch).await?;

        info!(
            task_id = %task.id,
            action = %action,
            status = %transition.task_status,
            "task transition committed"
        );

        if transition.completes {
            if cod > 0.0 {
                self.metrics.cod_collected_total.inc_by(cod);
            }
            self.publish(None);
            Ok(Some(CompletionNotice { cod_collected: cod }))
        } else {
            // render the new status right away; the task feed will confirm
            let mut updated = task;
            updated.status = transition.task_status;
            self.publish(Some(updated));
            Ok(None)
        }
    }

    /// After the rider phones the contact of a fresh task, promote it to
    /// `verified`. Ownership and status are re-checked against the live
    /// store first; anything already past that point is left alone.
    pub async fn note_contacted(&self) -> Result<(), AppError> {
        let task = self.cached_task().ok_or(AppError::NoActiveTask)?;
        if !matches!(task.status, TaskStatus::Assigned | TaskStatus::InProgress) {
            return Ok(());
        }

        let rider = match self.store.get("riders", &self.rider_id).await? {
            Some(doc) => doc.parse::<Rider>()?,
            None => return Ok(()),
        };
        if rider.current_task.map(|r| r.id) != Some(task.id.clone()) {
            return Ok(());
        }

        let fresh = match self.store.get("tasks", &task.id).await? {
            Some(doc) => doc.parse::<Task>()?,
            None => return Ok(()),
        };
        if !matches!(fresh.status, TaskStatus::Assigned | TaskStatus::InProgress) {
            return Ok(());
        }

        self.store
            .commit(WriteBatch::new().update(
                "tasks",
                &task.id,
                vec![(
                    "status",
                    FieldWrite::Set(json!(TaskStatus::Verified.as_str())),
                )],
            ))
            .await?;

        info!(task_id = %task.id, "task verified after contact call");
        Ok(())
    }
}
