use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::rider::Rider;
use crate::observability::metrics::Metrics;
use crate::store::{DocumentStore, FieldWrite, WriteBatch};

#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub rider_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub cod_balance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepositReceipt {
    pub deposit_id: String,
    pub amount: f64,
}

/// The rider's cash ledger: balance display and the deposit handover.
pub struct AccountService {
    store: Arc<dyn DocumentStore>,
    metrics: Metrics,
    rider_id: String,
}

impl AccountService {
    pub fn new(store: Arc<dyn DocumentStore>, metrics: Metrics, rider_id: String) -> Self {
        Self {
            store,
            metrics,
            rider_id,
        }
    }

    pub async fn view(&self) -> Result<AccountView, AppError> {
        let rider = self.fetch_rider().await?;
        Ok(AccountView {
            rider_id: self.rider_id.clone(),
            name: rider.name,
            email: rider.email,
            cod_balance: rider.account.cod_balance,
        })
    }

    /// Hand the collected cash to the operator: zero the balance and
    /// append a deposit record, in one batch. Rejected when there is
    /// nothing to deposit.
    pub async fn deposit(&self) -> Result<DepositReceipt, AppError> {
        let rider = self.fetch_rider().await?;
        let amount = rider.account.cod_balance;
        if amount <= 0.0 {
            return Err(AppError::NothingToDeposit);
        }

        let deposit_id = Uuid::new_v4().to_string();
        let batch = WriteBatch::new()
            .update(
                "riders",
                &self.rider_id,
                vec![("account.cod_balance", FieldWrite::Set(json!(0.0)))],
            )
            .put(
                "cod_deposits",
                &deposit_id,
                vec![
                    ("riderId", FieldWrite::Set(json!(self.rider_id))),
                    ("riderName", FieldWrite::Set(json!(rider.name))),
                    ("amountDeposited", FieldWrite::Set(json!(amount))),
                    ("depositTimestamp", FieldWrite::ServerTimestamp),
                    ("status", FieldWrite::Set(json!("DEPOSITED_BY_RIDER"))),
                ],
            );
        self.store.commit(batch).await?;

        self.metrics.cod_deposited_total.inc_by(amount);
        info!(rider_id = %self.rider_id, amount, "cod balance deposited");
        Ok(DepositReceipt { deposit_id, amount })
    }

    async fn fetch_rider(&self) -> Result<Rider, AppError> {
        self.store
            .get("riders", &self.rider_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("rider {}", self.rider_id)))?
            .parse::<Rider>()
            .map_err(AppError::from)
    }
}
