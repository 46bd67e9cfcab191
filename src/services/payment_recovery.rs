//! Operator-driven settlement for bills whose callback never arrived or could
//! not be reconciled

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, warn};

use crate::database::commission_repository::LedgerUpdate;
use crate::database::keys;
use crate::error::{
    AppError, AppErrorKind, DomainError, ReconciliationError, ValidationError,
};
use crate::payments::types::{amount_to_json, parse_amount};
use crate::services::callback_reconciler::{
    CallbackReconciler, ResolutionSource, Settlement, SettlementOutcome,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPaymentRequest {
    pub bill_code: Option<String>,
    pub driver_id: Option<String>,
    pub amount: Option<JsonValue>,
    pub reference: Option<String>,
    pub invoice_no: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverPaymentRequest {
    pub bill_code: Option<String>,
    pub driver_id: Option<String>,
    pub amount: Option<JsonValue>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionUpdateRequest {
    pub driver_id: Option<String>,
    pub amount: Option<JsonValue>,
    pub bill_code: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResponse {
    pub success: bool,
    pub bill_code: String,
    pub driver_id: String,
    pub amount: JsonValue,
    pub reference: String,
    pub source: ResolutionSource,
    pub payment_id: String,
    pub payment_recorded: bool,
    pub commission_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unpaid_commission: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommissionUpdateResponse {
    pub success: bool,
    pub driver_id: String,
    pub amount: JsonValue,
    pub path: String,
    pub previous_unpaid: JsonValue,
    pub unpaid_commission: JsonValue,
    pub paid_commission: JsonValue,
}

impl From<LedgerUpdate> for CommissionUpdateResponse {
    fn from(update: LedgerUpdate) -> Self {
        Self {
            success: true,
            driver_id: update.driver_id,
            amount: amount_to_json(update.amount),
            path: update.path,
            previous_unpaid: amount_to_json(update.before.unpaid_commission),
            unpaid_commission: amount_to_json(update.after.unpaid_commission),
            paid_commission: amount_to_json(update.after.paid_commission),
        }
    }
}

pub struct PaymentRecoveryService {
    reconciler: Arc<CallbackReconciler>,
}

impl PaymentRecoveryService {
    pub fn new(reconciler: Arc<CallbackReconciler>) -> Self {
        Self { reconciler }
    }

    /// Settle a bill by code. Supplied driver, amount and reference take
    /// precedence over what the mapping and external reference provide.
    pub async fn process(
        &self,
        request: &ProcessPaymentRequest,
    ) -> Result<SettlementResponse, AppError> {
        let bill_code = key_text(&request.bill_code, "billCode")?
            .ok_or_else(|| AppError::missing_fields(["billCode"]))?;
        let override_amount = optional_amount(&request.amount, "amount")?;

        let mut resolution = self.reconciler.resolve(bill_code, None).await;
        let mut overridden = false;
        if let Some(driver_id) = key_text(&request.driver_id, "driverId")? {
            resolution.driver_id = Some(driver_id.to_string());
            overridden = true;
        }
        if let Some(amount) = override_amount {
            resolution.amount = Some(amount);
            overridden = true;
        }
        if let Some(reference) = required_text(&request.reference) {
            resolution.reference = Some(reference.to_string());
        }
        if overridden {
            resolution.source = ResolutionSource::Override;
        }

        let (driver_id, amount) = match resolution.resolved() {
            Some((driver_id, amount)) => (driver_id.to_string(), amount),
            None => {
                warn!(
                    bill_code,
                    driver_resolved = resolution.driver_id.is_some(),
                    amount_resolved = resolution.amount.is_some(),
                    "manual settlement could not resolve the bill"
                );
                return Err(AppError::new(AppErrorKind::Reconciliation(
                    ReconciliationError::Gap {
                        bill_code: bill_code.to_string(),
                        driver_resolved: resolution.driver_id.is_some(),
                        amount_resolved: resolution.amount.is_some(),
                    },
                )));
            }
        };

        let settlement = Settlement {
            bill_code: bill_code.to_string(),
            driver_id,
            amount,
            reference: resolution.reference.clone().unwrap_or_default(),
            invoice_no: required_text(&request.invoice_no).map(str::to_string),
        };
        self.settle(settlement, resolution.source, "manual").await
    }

    /// Rewrite the mapping from operator input, then settle
    pub async fn recover(
        &self,
        request: &RecoverPaymentRequest,
    ) -> Result<SettlementResponse, AppError> {
        let bill_code = key_text(&request.bill_code, "billCode")?;
        let driver_id = key_text(&request.driver_id, "driverId")?;
        let amount = optional_amount(&request.amount, "amount")?;

        let (bill_code, driver_id, amount) = match (bill_code, driver_id, amount) {
            (Some(b), Some(d), Some(a)) => (b, d, a),
            (b, d, a) => {
                let mut missing = Vec::new();
                if b.is_none() {
                    missing.push("billCode");
                }
                if d.is_none() {
                    missing.push("driverId");
                }
                if a.is_none() {
                    missing.push("amount");
                }
                return Err(AppError::missing_fields(missing));
            }
        };
        let reference = required_text(&request.reference).unwrap_or_default();

        self.reconciler
            .mappings()
            .put_recovered(bill_code, driver_id, amount, reference)
            .await?;
        info!(bill_code, driver_id, amount = %amount, "🛠️ bill mapping recovered");

        let settlement = Settlement {
            bill_code: bill_code.to_string(),
            driver_id: driver_id.to_string(),
            amount,
            reference: reference.to_string(),
            invoice_no: None,
        };
        self.settle(settlement, ResolutionSource::Override, "recovery")
            .await
    }

    /// Ledger-only adjustment; no payment record is written
    pub async fn update_commission(
        &self,
        request: &CommissionUpdateRequest,
    ) -> Result<CommissionUpdateResponse, AppError> {
        let driver_id = key_text(&request.driver_id, "driverId")?;
        let amount = optional_amount(&request.amount, "amount")?;
        let (driver_id, amount) = match (driver_id, amount) {
            (Some(d), Some(a)) => (d, a),
            (d, a) => {
                let mut missing = Vec::new();
                if d.is_none() {
                    missing.push("driverId");
                }
                if a.is_none() {
                    missing.push("amount");
                }
                return Err(AppError::missing_fields(missing));
            }
        };

        let update = self
            .reconciler
            .ledger()
            .reduce_unpaid(
                driver_id,
                amount,
                required_text(&request.bill_code).unwrap_or("manual"),
                required_text(&request.reference).unwrap_or_default(),
            )
            .await?;
        Ok(update.into())
    }

    async fn settle(
        &self,
        settlement: Settlement,
        source: ResolutionSource,
        origin: &str,
    ) -> Result<SettlementResponse, AppError> {
        let outcome = self.reconciler.settle(&settlement, origin).await;
        let mut response = SettlementResponse {
            success: true,
            bill_code: settlement.bill_code.clone(),
            driver_id: settlement.driver_id.clone(),
            amount: amount_to_json(settlement.amount),
            reference: settlement.reference.clone(),
            source,
            payment_id: String::new(),
            payment_recorded: false,
            commission_updated: false,
            unpaid_commission: None,
            warning: None,
        };

        match outcome {
            SettlementOutcome::Settled { payment, ledger } => {
                response.payment_id = payment.record.payment_id;
                response.payment_recorded = true;
                response.commission_updated = true;
                response.unpaid_commission = Some(amount_to_json(ledger.after.unpaid_commission));
                Ok(response)
            }
            SettlementOutcome::LedgerFailed { payment, .. } => {
                response.payment_id = payment.record.payment_id;
                response.payment_recorded = true;
                response.warning = Some("CommissionUpdateFailed".to_string());
                Ok(response)
            }
            SettlementOutcome::PaymentRecordFailed { error } => {
                Err(AppError::from(error).with_context("payment record"))
            }
            SettlementOutcome::Duplicate => Err(AppError::new(AppErrorKind::Domain(
                DomainError::DuplicateSettlement {
                    bill_code: settlement.bill_code,
                },
            ))),
        }
    }
}

fn required_text(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Like `required_text`, for values that become part of a store path
fn key_text<'a>(value: &'a Option<String>, field: &str) -> Result<Option<&'a str>, AppError> {
    match required_text(value) {
        Some(key) if !keys::is_valid_key(key) => Err(AppError::new(AppErrorKind::Validation(
            ValidationError::InvalidField {
                field: field.to_string(),
                reason: "must not contain '/', '.', '#', '$', '[', ']' or control characters"
                    .to_string(),
            },
        ))),
        key => Ok(key),
    }
}

/// Absent, null or blank is `None`; anything else must be a positive amount
fn optional_amount(value: &Option<JsonValue>, field: &str) -> Result<Option<Decimal>, AppError> {
    match value {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) if s.trim().is_empty() => Ok(None),
        Some(raw) => match parse_amount(raw) {
            Some(amount) if amount > Decimal::ZERO => Ok(Some(amount)),
            _ => Err(AppError::new(AppErrorKind::Validation(
                ValidationError::InvalidField {
                    field: field.to_string(),
                    reason: format!("must be a positive amount, got {}", raw),
                },
            ))),
        },
    }
}
