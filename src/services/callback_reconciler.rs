//! Payment callback reconciliation
//!
//! Turns an asynchronous gateway notification into a payment record and a
//! commission ledger update:
//!
//! 1. extract the bill code (body first, then query, across all aliases)
//! 2. check the payment status
//! 3. resolve driver and amount from the bill mapping, retrying while the
//!    mapping is missing or partial, then fall back to the external reference
//!    number plus a driver-id prefix search
//! 4. claim the bill code so replays are ignored
//! 5. append the payment record
//! 6. reduce the driver's unpaid commission
//!
//! The gateway always gets HTTP 200; the outcome is described in the
//! [`CallbackAck`] body.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::ReconciliationConfig;
use crate::database::bill_mapping_repository::{BillMapping, BillMappingRepository};
use crate::database::commission_repository::{CommissionRepository, LedgerUpdate};
use crate::database::driver_directory::DriverDirectory;
use crate::database::error::DatabaseError;
use crate::database::keys;
use crate::database::payment_record_repository::{PaymentRecordRepository, StoredPayment};
use crate::database::processed_callback_repository::{ClaimOutcome, ProcessedCallbackRepository};
use crate::database::SharedStore;
use crate::payments::reference;
use crate::payments::types::parse_amount_str;
use crate::services::callback_fields::{CallbackField, CallbackPayload};
use crate::services::retry::{RetryPolicy, Sleeper};

pub const PAID_STATUS: &str = "1";

/// Progress through a single callback, for logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStage {
    Received,
    BillCodeResolved,
    DataResolved,
    PaymentRecorded,
    LedgerUpdated,
    Acked,
}

/// Where the driver and amount came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionSource {
    Mapping,
    ExternalReference,
    /// Partial mapping completed from the external reference
    Mixed,
    Override,
    Unresolved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub bill_code: String,
    pub driver_id: Option<String>,
    pub amount: Option<Decimal>,
    pub reference: Option<String>,
    pub source: ResolutionSource,
    pub mapping_found: bool,
}

impl Resolution {
    /// Driver and amount, when both are known
    pub fn resolved(&self) -> Option<(&str, Decimal)> {
        match (&self.driver_id, self.amount) {
            (Some(driver_id), Some(amount)) => Some((driver_id.as_str(), amount)),
            _ => None,
        }
    }
}

/// Everything needed to settle one bill
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub bill_code: String,
    pub driver_id: String,
    pub amount: Decimal,
    pub reference: String,
    pub invoice_no: Option<String>,
}

#[derive(Debug)]
pub enum SettlementOutcome {
    Settled {
        payment: StoredPayment,
        ledger: LedgerUpdate,
    },
    /// Payment recorded, ledger stale
    LedgerFailed {
        payment: StoredPayment,
        error: DatabaseError,
    },
    /// Nothing was written
    PaymentRecordFailed { error: DatabaseError },
    Duplicate,
}

/// Response body for the gateway
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallbackAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_recorded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission_updated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
}

impl CallbackAck {
    fn received() -> Self {
        Self {
            received: true,
            ..Self::default()
        }
    }

    pub fn no_bill_code() -> Self {
        Self {
            error: Some("NoBillCode".to_string()),
            ..Self::received()
        }
    }

    pub fn unreadable_payload() -> Self {
        Self {
            error: Some("UnreadablePayload".to_string()),
            ..Self::received()
        }
    }

    pub fn internal_error() -> Self {
        Self {
            error: Some("InternalError".to_string()),
            ..Self::received()
        }
    }

    pub fn not_paid(bill_code: &str, status: &str) -> Self {
        Self {
            bill_code: Some(bill_code.to_string()),
            paid: Some(false),
            status: Some(status.to_string()),
            ..Self::received()
        }
    }

    pub fn missing_driver_or_amount(bill_code: &str) -> Self {
        Self {
            error: Some("MissingDriverOrAmount".to_string()),
            bill_code: Some(bill_code.to_string()),
            ..Self::received()
        }
    }

    pub fn payment_record_failed(bill_code: &str) -> Self {
        Self {
            error: Some("PaymentRecordFailed".to_string()),
            bill_code: Some(bill_code.to_string()),
            processed: Some(false),
            ..Self::received()
        }
    }

    pub fn commission_update_failed(bill_code: &str) -> Self {
        Self {
            warning: Some("CommissionUpdateFailed".to_string()),
            bill_code: Some(bill_code.to_string()),
            payment_recorded: Some(true),
            commission_updated: Some(false),
            ..Self::received()
        }
    }

    pub fn duplicate(bill_code: &str) -> Self {
        Self {
            duplicate: Some(true),
            bill_code: Some(bill_code.to_string()),
            ..Self::received()
        }
    }

    pub fn settled(bill_code: &str) -> Self {
        Self {
            success: Some(true),
            bill_code: Some(bill_code.to_string()),
            payment_recorded: Some(true),
            commission_updated: Some(true),
            ..Self::received()
        }
    }
}

pub struct CallbackReconciler {
    mappings: BillMappingRepository,
    payments: PaymentRecordRepository,
    ledger: CommissionRepository,
    directory: DriverDirectory,
    processed: ProcessedCallbackRepository,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    dedup_enabled: bool,
}

impl CallbackReconciler {
    pub fn new(
        store: SharedStore,
        config: &ReconciliationConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            mappings: BillMappingRepository::new(store.clone()),
            payments: PaymentRecordRepository::new(store.clone()),
            ledger: CommissionRepository::new(store.clone()),
            directory: DriverDirectory::new(store.clone()),
            processed: ProcessedCallbackRepository::new(store),
            retry: RetryPolicy::from_config(config),
            sleeper,
            dedup_enabled: config.dedup_enabled,
        }
    }

    pub fn dedup_enabled(&self) -> bool {
        self.dedup_enabled
    }

    pub fn mappings(&self) -> &BillMappingRepository {
        &self.mappings
    }

    pub fn ledger(&self) -> &CommissionRepository {
        &self.ledger
    }

    pub fn processed(&self) -> &ProcessedCallbackRepository {
        &self.processed
    }

    /// Process one gateway callback. Never fails: every outcome is an ack.
    pub async fn handle(&self, payload: &CallbackPayload) -> CallbackAck {
        let ack = self.reconcile(payload).await;
        info!(
            stage = ?ReconcileStage::Acked,
            bill_code = ack.bill_code.as_deref().unwrap_or("-"),
            error = ack.error.as_deref().unwrap_or("-"),
            warning = ack.warning.as_deref().unwrap_or("-"),
            "callback acknowledged"
        );
        ack
    }

    async fn reconcile(&self, payload: &CallbackPayload) -> CallbackAck {
        info!(
            stage = ?ReconcileStage::Received,
            fields = ?payload.keys(),
            "📥 payment callback received"
        );

        let bill_code = match payload.get(CallbackField::BillCode) {
            Some(code) if keys::is_valid_key(&code) => code,
            Some(code) => {
                error!(bill_code = ?code, "callback bill code is not a valid store key");
                return CallbackAck::no_bill_code();
            }
            None => {
                error!(fields = ?payload.keys(), "callback without a bill code");
                return CallbackAck::no_bill_code();
            }
        };
        info!(stage = ?ReconcileStage::BillCodeResolved, bill_code = %bill_code, "bill code extracted");

        match payload.get(CallbackField::PaymentStatus) {
            Some(status) if status == PAID_STATUS => {}
            Some(status) => {
                info!(bill_code = %bill_code, status = %status, "payment not successful, nothing to settle");
                return CallbackAck::not_paid(&bill_code, &status);
            }
            None => {
                // Some gateway configurations only call back for successful payments
                warn!(bill_code = %bill_code, "callback has no status field, treating as paid");
            }
        }

        let external_reference_no = payload.get(CallbackField::ExternalReferenceNo);
        let resolution = self
            .resolve(&bill_code, external_reference_no.as_deref())
            .await;

        let (driver_id, amount) = match resolution.resolved() {
            Some((driver_id, amount)) => (driver_id.to_string(), amount),
            None => {
                error!(
                    bill_code = %bill_code,
                    driver_resolved = resolution.driver_id.is_some(),
                    amount_resolved = resolution.amount.is_some(),
                    mapping_found = resolution.mapping_found,
                    external_reference_no = external_reference_no.as_deref().unwrap_or("-"),
                    "🚨 RECONCILIATION GAP: could not resolve driver or amount, manual recovery required"
                );
                return CallbackAck::missing_driver_or_amount(&bill_code);
            }
        };

        if let Some(reported) = payload
            .get(CallbackField::Amount)
            .and_then(|a| parse_amount_str(&a))
        {
            if reported != amount {
                warn!(
                    bill_code = %bill_code,
                    reported = %reported,
                    resolved = %amount,
                    "callback amount differs from the resolved amount"
                );
            }
        }

        info!(
            stage = ?ReconcileStage::DataResolved,
            bill_code = %bill_code,
            driver_id = %driver_id,
            amount = %amount,
            source = ?resolution.source,
            "payment data resolved"
        );

        let settlement = Settlement {
            bill_code: bill_code.clone(),
            driver_id,
            amount,
            reference: resolution.reference.clone().unwrap_or_default(),
            invoice_no: payload.get(CallbackField::InvoiceNo),
        };

        match self.settle(&settlement, "callback").await {
            SettlementOutcome::Settled { .. } => CallbackAck::settled(&bill_code),
            SettlementOutcome::LedgerFailed { .. } => CallbackAck::commission_update_failed(&bill_code),
            SettlementOutcome::PaymentRecordFailed { .. } => {
                CallbackAck::payment_record_failed(&bill_code)
            }
            SettlementOutcome::Duplicate => CallbackAck::duplicate(&bill_code),
        }
    }

    /// Resolve driver, amount and reference for a bill code
    pub async fn resolve(
        &self,
        bill_code: &str,
        external_reference_no: Option<&str>,
    ) -> Resolution {
        let mapping = self.lookup_mapping(bill_code).await;

        if let Some(m) = mapping.as_ref().filter(|m| m.is_complete()) {
            return Resolution {
                bill_code: bill_code.to_string(),
                driver_id: m.driver_id.clone(),
                amount: m.amount,
                reference: m.reference.clone(),
                source: ResolutionSource::Mapping,
                mapping_found: true,
            };
        }

        let mut resolution = Resolution {
            bill_code: bill_code.to_string(),
            driver_id: mapping.as_ref().and_then(|m| m.driver_id.clone()),
            amount: mapping.as_ref().and_then(|m| m.amount),
            reference: mapping.as_ref().and_then(|m| m.reference.clone()),
            source: ResolutionSource::Unresolved,
            mapping_found: mapping.is_some(),
        };

        let external = external_reference_no
            .map(str::to_string)
            .or_else(|| mapping.as_ref().and_then(|m| m.external_reference_no.clone()));

        let decoded = match external.as_deref().and_then(reference::decode) {
            Some(decoded) => decoded,
            None => {
                warn!(
                    bill_code,
                    external_reference_no = external.as_deref().unwrap_or("-"),
                    "no usable external reference number for fallback"
                );
                return resolution;
            }
        };

        info!(
            bill_code,
            reference = %decoded.reference,
            driver_prefix = %decoded.driver_prefix,
            amount = ?decoded.amount,
            "falling back to external reference number"
        );

        if resolution.driver_id.is_none() {
            resolution.driver_id = match self.directory.find_by_prefix(&decoded.driver_prefix).await
            {
                Ok(found) => found,
                Err(e) => {
                    warn!(bill_code, error = %e, "driver prefix search failed");
                    None
                }
            };
        }
        if resolution.amount.is_none() {
            resolution.amount = decoded.amount.filter(|a| *a > Decimal::ZERO);
        }
        if resolution.reference.is_none() {
            resolution.reference = Some(decoded.reference);
        }

        if resolution.resolved().is_some() {
            resolution.source = if resolution.mapping_found {
                ResolutionSource::Mixed
            } else {
                ResolutionSource::ExternalReference
            };
        }
        resolution
    }

    /// Read the mapping, retrying while it is missing, partial or the store is
    /// briefly unavailable. Returns the last partial mapping seen.
    async fn lookup_mapping(&self, bill_code: &str) -> Option<BillMapping> {
        let mut partial = None;

        for attempt in 1..=self.retry.max_attempts {
            let found = self
                .mappings
                .get(bill_code)
                .await
                .map(|m| m.map(drop_invalid_driver));
            match found {
                Ok(Some(mapping)) if mapping.is_complete() => return Some(mapping),
                Ok(Some(mapping)) => {
                    warn!(
                        bill_code,
                        attempt,
                        has_driver = mapping.driver_id.is_some(),
                        has_amount = mapping.amount.is_some(),
                        "bill mapping is partial"
                    );
                    partial = Some(mapping);
                }
                Ok(None) => warn!(bill_code, attempt, "bill mapping not found"),
                Err(e) if e.is_retryable() => {
                    warn!(bill_code, attempt, error = %e, "bill mapping lookup failed");
                }
                Err(e) => {
                    error!(bill_code, attempt, error = %e, "bill mapping lookup failed permanently");
                    break;
                }
            }

            if self.retry.should_retry(attempt) {
                self.sleeper.sleep(self.retry.delay_for(attempt)).await;
            }
        }

        partial
    }

    /// Claim, record, then update the ledger. The ledger is never touched
    /// without a durable payment record.
    pub async fn settle(&self, settlement: &Settlement, source: &str) -> SettlementOutcome {
        let bill_code = settlement.bill_code.as_str();

        if self.dedup_enabled {
            match self
                .processed
                .claim(bill_code, &settlement.driver_id, settlement.amount, source)
                .await
            {
                Ok(ClaimOutcome::Claimed) => {}
                Ok(ClaimOutcome::AlreadyProcessed) => return SettlementOutcome::Duplicate,
                Err(error) => {
                    error!(bill_code, error = %error, "could not claim bill for settlement");
                    return SettlementOutcome::PaymentRecordFailed { error };
                }
            }
        }

        let payment = match self
            .payments
            .append(
                &settlement.driver_id,
                settlement.amount,
                bill_code,
                &settlement.reference,
                settlement.invoice_no.as_deref(),
            )
            .await
        {
            Ok(payment) => payment,
            Err(error) => {
                error!(
                    bill_code,
                    driver_id = %settlement.driver_id,
                    error = %error,
                    "payment record failed, commission left untouched"
                );
                if self.dedup_enabled {
                    if let Err(e) = self.processed.release(bill_code).await {
                        error!(bill_code, error = %e, "failed to release settlement claim");
                    }
                }
                return SettlementOutcome::PaymentRecordFailed { error };
            }
        };
        info!(
            stage = ?ReconcileStage::PaymentRecorded,
            bill_code,
            payment_id = %payment.record.payment_id,
            "payment recorded"
        );

        match self
            .ledger
            .reduce_unpaid(
                &settlement.driver_id,
                settlement.amount,
                bill_code,
                &settlement.reference,
            )
            .await
        {
            Ok(ledger) => {
                info!(stage = ?ReconcileStage::LedgerUpdated, bill_code, "commission ledger updated");
                SettlementOutcome::Settled { payment, ledger }
            }
            Err(error) => {
                warn!(
                    bill_code,
                    driver_id = %settlement.driver_id,
                    amount = %settlement.amount,
                    payment_id = %payment.record.payment_id,
                    error = %error,
                    "⚠️ LEDGER STALE: payment recorded but commission not updated, manual reconciliation required"
                );
                SettlementOutcome::LedgerFailed { payment, error }
            }
        }
    }
}

/// A driver id that cannot name a ledger node is treated as missing
fn drop_invalid_driver(mut mapping: BillMapping) -> BillMapping {
    if let Some(driver_id) = mapping.driver_id.as_deref() {
        if !keys::is_valid_key(driver_id) {
            warn!(
                bill_code = %mapping.bill_code,
                driver_id = ?driver_id,
                "mapping driver id is not a valid store key, ignoring it"
            );
            mapping.driver_id = None;
        }
    }
    mapping
}
