use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{error, info};
use uuid::Uuid;

use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::keys::payment::HistoryPath;
use crate::database::SharedStore;
use crate::payments::types::amount_to_json;

pub const PAYMENT_METHOD: &str = "ToyyibPay";

/// Immutable entry in a driver's payment history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub payment_id: String,
    pub amount: JsonValue,
    pub bill_code: String,
    pub reference: String,
    pub invoice_no: Option<String>,
    pub status: String,
    pub payment_method: String,
    pub timestamp: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredPayment {
    pub key: String,
    pub path: String,
    pub record: PaymentRecord,
}

/// `payment_{millis}_{9 random chars}`; collisions only risk a cosmetic
/// duplicate in an append-only list
pub fn generate_payment_id(now_ms: i64) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(9).collect();
    format!("payment_{}_{}", now_ms, suffix)
}

pub struct PaymentRecordRepository {
    store: SharedStore,
}

impl PaymentRecordRepository {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Append a paid record under the driver's payment history
    pub async fn append(
        &self,
        driver_id: &str,
        amount: Decimal,
        bill_code: &str,
        reference: &str,
        invoice_no: Option<&str>,
    ) -> DatabaseResult<StoredPayment> {
        if driver_id.trim().is_empty() || bill_code.trim().is_empty() || amount <= Decimal::ZERO {
            return Err(DatabaseError::invalid_input(
                "payment record requires driverId, billCode and a positive amount",
            ));
        }

        let now = Utc::now();
        let record = PaymentRecord {
            payment_id: generate_payment_id(now.timestamp_millis()),
            amount: amount_to_json(amount),
            bill_code: bill_code.to_string(),
            reference: reference.to_string(),
            invoice_no: invoice_no.map(str::to_string),
            status: "paid".to_string(),
            payment_method: PAYMENT_METHOD.to_string(),
            timestamp: now.timestamp_millis(),
            created_at: now.to_rfc3339(),
        };

        let doc = serde_json::to_value(&record).map_err(|e| DatabaseError::Malformed {
            path: HistoryPath::new(driver_id).to_string(),
            message: e.to_string(),
        })?;

        let path = HistoryPath::new(driver_id).to_string();
        match self.store.push(&path, &doc).await {
            Ok(key) => {
                info!(
                    driver_id,
                    bill_code,
                    payment_id = %record.payment_id,
                    key = %key,
                    "💾 payment record written"
                );
                Ok(StoredPayment { key, path, record })
            }
            Err(e) => {
                error!(driver_id, bill_code, path = %path, error = %e, "failed to write payment record");
                Err(e)
            }
        }
    }

    /// Payment history for a driver, oldest first
    pub async fn list(&self, driver_id: &str) -> DatabaseResult<Vec<PaymentRecord>> {
        let path = HistoryPath::new(driver_id).to_string();
        let doc = match self.store.get(&path).await? {
            Some(JsonValue::Object(map)) => map,
            _ => return Ok(Vec::new()),
        };

        let mut entries: Vec<(String, JsonValue)> = doc.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries
            .into_iter()
            .filter_map(|(_, v)| serde_json::from_value(v).ok())
            .collect())
    }
}
