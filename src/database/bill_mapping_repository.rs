use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use tracing::{error, info, warn};

use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::keys::{self, bill::MappingPath};
use crate::database::SharedStore;
use crate::payments::types::{amount_to_json, parse_amount};

const EXTERNAL_REFERENCE_ALIASES: &[&str] = &[
    "billExternalReferenceNo",
    "bill_external_reference_no",
    "externalReferenceNo",
];

/// Correlation record linking a gateway bill code to the driver and amount it
/// was created for. Fields are optional because records written by older
/// clients can be partial.
#[derive(Debug, Clone, PartialEq)]
pub struct BillMapping {
    pub bill_code: String,
    pub driver_id: Option<String>,
    pub amount: Option<Decimal>,
    pub reference: Option<String>,
    pub external_reference_no: Option<String>,
    pub created_at: Option<String>,
    pub recovered: bool,
}

impl BillMapping {
    pub fn is_complete(&self) -> bool {
        self.driver_id.is_some() && self.amount.is_some()
    }

    fn from_document(bill_code: &str, doc: &JsonValue) -> Option<Self> {
        let obj = doc.as_object()?;
        let text = |key: &str| {
            obj.get(key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Some(Self {
            bill_code: bill_code.to_string(),
            driver_id: text("driverId"),
            amount: obj
                .get("amount")
                .and_then(parse_amount)
                .filter(|a| *a > Decimal::ZERO),
            reference: text("reference"),
            external_reference_no: EXTERNAL_REFERENCE_ALIASES.iter().find_map(|k| text(*k)),
            created_at: text("createdAt"),
            recovered: obj
                .get("recovered")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        })
    }
}

pub struct BillMappingRepository {
    store: SharedStore,
}

impl BillMappingRepository {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Full-replace write of the mapping for a new bill
    pub async fn put(
        &self,
        bill_code: &str,
        driver_id: &str,
        amount: Decimal,
        reference: &str,
        external_reference_no: &str,
    ) -> DatabaseResult<()> {
        validate(bill_code, driver_id, amount)?;

        let now = Utc::now();
        let doc = json!({
            "driverId": driver_id,
            "amount": amount_to_json(amount),
            "reference": reference,
            "billExternalReferenceNo": external_reference_no,
            "createdAt": now.to_rfc3339(),
            "timestamp": now.timestamp_millis(),
        });

        self.write(bill_code, &doc).await
    }

    /// Operator-supplied mapping for a bill whose original mapping was lost
    pub async fn put_recovered(
        &self,
        bill_code: &str,
        driver_id: &str,
        amount: Decimal,
        reference: &str,
    ) -> DatabaseResult<()> {
        validate(bill_code, driver_id, amount)?;

        let now = Utc::now();
        let doc = json!({
            "driverId": driver_id,
            "amount": amount_to_json(amount),
            "reference": reference,
            "recovered": true,
            "recoveredAt": now.to_rfc3339(),
            "timestamp": now.timestamp_millis(),
        });

        self.write(bill_code, &doc).await
    }

    async fn write(&self, bill_code: &str, doc: &JsonValue) -> DatabaseResult<()> {
        let path = MappingPath::new(bill_code).to_string();
        match self.store.put(&path, doc).await {
            Ok(()) => {
                info!(bill_code, path = %path, "💾 bill mapping stored");
                Ok(())
            }
            Err(e) => {
                error!(bill_code, path = %path, error = %e, "failed to store bill mapping");
                Err(e)
            }
        }
    }

    pub async fn get(&self, bill_code: &str) -> DatabaseResult<Option<BillMapping>> {
        let path = MappingPath::new(bill_code).to_string();
        let doc = match self.store.get(&path).await? {
            Some(doc) => doc,
            None => return Ok(None),
        };

        let mapping = BillMapping::from_document(bill_code, &doc);
        if mapping.is_none() {
            warn!(bill_code, payload = %doc, "bill mapping is not an object, treating as absent");
        }
        Ok(mapping)
    }
}

fn validate(bill_code: &str, driver_id: &str, amount: Decimal) -> DatabaseResult<()> {
    if !keys::is_valid_key(bill_code.trim())
        || !keys::is_valid_key(driver_id.trim())
        || amount <= Decimal::ZERO
    {
        return Err(DatabaseError::invalid_input(format!(
            "bill mapping requires billCode, driverId and a positive amount (billCode='{}', driverId='{}', amount={})",
            bill_code, driver_id, amount
        )));
    }
    Ok(())
}
