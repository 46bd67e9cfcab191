use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};

use crate::database::error::DatabaseResult;
use crate::database::keys::callback::ProcessedPath;
use crate::database::SharedStore;
use crate::payments::types::amount_to_json;

/// Settlement claims keyed by bill code, so a replayed callback cannot apply
/// the same payment twice
pub struct ProcessedCallbackRepository {
    store: SharedStore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadyProcessed,
}

impl ProcessedCallbackRepository {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Compare-and-set claim on the bill code
    pub async fn claim(
        &self,
        bill_code: &str,
        driver_id: &str,
        amount: Decimal,
        source: &str,
    ) -> DatabaseResult<ClaimOutcome> {
        let path = ProcessedPath::new(bill_code).to_string();
        let claimed = self
            .store
            .put_if_absent(
                &path,
                &json!({
                    "driverId": driver_id,
                    "amount": amount_to_json(amount),
                    "source": source,
                    "claimedAt": Utc::now().to_rfc3339(),
                }),
            )
            .await?;

        if claimed {
            info!(bill_code, driver_id, source, "settlement claimed");
            Ok(ClaimOutcome::Claimed)
        } else {
            warn!(bill_code, driver_id, source, "bill already settled, skipping");
            Ok(ClaimOutcome::AlreadyProcessed)
        }
    }

    /// Drop a claim so a later retry can settle the bill
    pub async fn release(&self, bill_code: &str) -> DatabaseResult<()> {
        let path = ProcessedPath::new(bill_code).to_string();
        self.store.delete(&path).await?;
        info!(bill_code, "settlement claim released");
        Ok(())
    }

    pub async fn is_processed(&self, bill_code: &str) -> DatabaseResult<bool> {
        let path = ProcessedPath::new(bill_code).to_string();
        Ok(self.store.get(&path).await?.is_some())
    }
}
