use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use tracing::{error, info, warn};

use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::keys::commission::{LegacySummaryPath, SummaryPath};
use crate::database::SharedStore;
use crate::payments::types::{amount_to_json, parse_amount};

/// Per-driver commission balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommissionSummary {
    pub unpaid_commission: Decimal,
    pub paid_commission: Decimal,
    pub total_commission: Decimal,
}

impl CommissionSummary {
    fn from_document(doc: &JsonValue) -> Option<Self> {
        let obj = doc.as_object()?;
        let field = |key: &str| {
            obj.get(key)
                .and_then(parse_amount)
                .unwrap_or(Decimal::ZERO)
        };
        Some(Self {
            unpaid_commission: field("unpaid_commission"),
            paid_commission: field("paid_commission"),
            total_commission: field("total_commission"),
        })
    }

    /// Apply a payment. Unpaid is recomputed from total and paid so earlier
    /// drift does not accumulate.
    pub fn apply_payment(&self, amount: Decimal) -> Self {
        let paid_commission = self.paid_commission + amount;
        let unpaid_commission = (self.total_commission - paid_commission).max(Decimal::ZERO);
        Self {
            unpaid_commission,
            paid_commission,
            total_commission: self.total_commission,
        }
    }
}

/// Where the summary that was updated lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerLocation {
    Primary,
    Legacy,
    /// No summary existed; a zeroed one was created at the primary path
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerUpdate {
    pub driver_id: String,
    pub path: String,
    pub location: LedgerLocation,
    pub amount: Decimal,
    pub before: CommissionSummary,
    pub after: CommissionSummary,
}

pub struct CommissionRepository {
    store: SharedStore,
}

impl CommissionRepository {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Current summary and its location, without creating anything
    pub async fn find_summary(
        &self,
        driver_id: &str,
    ) -> DatabaseResult<Option<(String, LedgerLocation, CommissionSummary)>> {
        let primary = SummaryPath::new(driver_id).to_string();
        let primary_error = match self.store.get(&primary).await {
            Ok(Some(doc)) => match CommissionSummary::from_document(&doc) {
                Some(summary) => return Ok(Some((primary, LedgerLocation::Primary, summary))),
                None => {
                    warn!(driver_id, path = %primary, "commission summary is not an object");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(driver_id, path = %primary, error = %e, "primary commission summary unreadable");
                Some(e)
            }
        };

        let legacy = LegacySummaryPath::new(driver_id).to_string();
        match self.store.get(&legacy).await {
            Ok(Some(doc)) => {
                if let Some(summary) = CommissionSummary::from_document(&doc) {
                    info!(driver_id, path = %legacy, "using legacy commission summary");
                    return Ok(Some((legacy, LedgerLocation::Legacy, summary)));
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(driver_id, path = %legacy, error = %e, "legacy commission summary unreadable");
            }
        }

        // An unreadable primary must not be mistaken for a missing one
        match primary_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    /// Record a payment against the driver's unpaid commission
    pub async fn reduce_unpaid(
        &self,
        driver_id: &str,
        amount: Decimal,
        bill_code: &str,
        reference: &str,
    ) -> DatabaseResult<LedgerUpdate> {
        if driver_id.trim().is_empty() || amount <= Decimal::ZERO {
            return Err(DatabaseError::invalid_input(
                "commission update requires driverId and a positive amount",
            ));
        }

        let result = self
            .reduce_unpaid_inner(driver_id, amount, bill_code, reference)
            .await;

        if let Err(e) = &result {
            if e.is_permission_denied() {
                error!(
                    driver_id,
                    bill_code,
                    error = %e,
                    "🔒 commission update denied by store rules"
                );
            } else {
                error!(driver_id, bill_code, error = %e, "commission update failed");
            }
        }
        result
    }

    async fn reduce_unpaid_inner(
        &self,
        driver_id: &str,
        amount: Decimal,
        bill_code: &str,
        reference: &str,
    ) -> DatabaseResult<LedgerUpdate> {
        let (path, location, before) = match self.find_summary(driver_id).await? {
            Some(found) => found,
            None => {
                let path = SummaryPath::new(driver_id).to_string();
                warn!(driver_id, path = %path, "no commission summary found, creating one");
                self.store
                    .put(
                        &path,
                        &json!({
                            "unpaid_commission": 0,
                            "total_commission": 0,
                            "total_rides": 0,
                            "paid_commission": 0,
                        }),
                    )
                    .await?;
                (path, LedgerLocation::Created, CommissionSummary::default())
            }
        };

        let after = before.apply_payment(amount);
        self.store
            .patch(
                &path,
                &json!({
                    "unpaid_commission": amount_to_json(after.unpaid_commission),
                    "paid_commission": amount_to_json(after.paid_commission),
                    "last_payment_date": Utc::now().to_rfc3339(),
                    "last_payment_amount": amount_to_json(amount),
                }),
            )
            .await?;

        info!(
            driver_id,
            bill_code,
            reference,
            path = %path,
            amount = %amount,
            unpaid_before = %before.unpaid_commission,
            unpaid_after = %after.unpaid_commission,
            paid_after = %after.paid_commission,
            "✅ commission updated"
        );

        Ok(LedgerUpdate {
            driver_id: driver_id.to_string(),
            path,
            location,
            amount,
            before,
            after,
        })
    }
}
