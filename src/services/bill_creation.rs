//! Bill creation: validate the app's request, build the gateway form, create
//! the bill and remember which driver and amount it belongs to.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::GatewayConfig;
use crate::database::bill_mapping_repository::BillMappingRepository;
use crate::database::keys;
use crate::error::{AppError, AppErrorKind, ValidationError};
use crate::payments::provider::BillGateway;
use crate::payments::reference;
use crate::payments::types::{amount_to_cents, format_amount, parse_amount, BillForm};
use crate::payments::utils::{
    looks_like_email, sanitize_phone, truncate_field, MAX_PHONE_LEN, MAX_TEXT_LEN,
};

pub const MIN_BILL_AMOUNT: Decimal = Decimal::ONE;
pub const MAX_BILL_AMOUNT: Decimal = Decimal::from_parts(10000, 0, 0, false, 0);
pub const CONTENT_EMAIL: &str = "Thank you for your payment!";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBillRequest {
    /// Number or numeric string, in ringgit
    pub amount: Option<JsonValue>,
    pub driver_id: Option<String>,
    pub reference: Option<String>,
    pub return_url: Option<String>,
    pub callback_url: Option<String>,
    pub bill_to: Option<String>,
    pub bill_email: Option<String>,
    pub bill_name: Option<String>,
    pub bill_description: Option<String>,
    pub bill_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateBillResponse {
    pub success: bool,
    pub bill_code: String,
    pub payment_url: String,
    pub external_reference_no: String,
    pub mapping_stored: bool,
    pub message: String,
}

/// Validated request fields
#[derive(Debug, Clone, PartialEq, Eq)]
struct ValidatedBill {
    amount: Decimal,
    driver_id: String,
    reference: String,
}

pub struct BillCreationService {
    gateway: Arc<dyn BillGateway>,
    mappings: BillMappingRepository,
    config: GatewayConfig,
}

impl BillCreationService {
    pub fn new(
        gateway: Arc<dyn BillGateway>,
        mappings: BillMappingRepository,
        config: GatewayConfig,
    ) -> Self {
        Self {
            gateway,
            mappings,
            config,
        }
    }

    pub async fn create_bill(
        &self,
        request: &CreateBillRequest,
    ) -> Result<CreateBillResponse, AppError> {
        let bill = validate(request)?;
        let external_reference_no = reference::encode(
            &bill.reference,
            &bill.driver_id,
            bill.amount,
            Utc::now().timestamp_millis(),
        );
        let form = self.build_form(request, &bill, &external_reference_no)?;

        info!(
            driver_id = %bill.driver_id,
            amount = %bill.amount,
            reference = %bill.reference,
            external_reference_no = %form.external_reference_no,
            environment = self.gateway.environment(),
            "🧾 creating commission bill"
        );

        let created = self.gateway.create_bill(&form).await?;

        // The bill already exists at the gateway; a failed mapping write is
        // recoverable through the callback fallback or manual recovery.
        let mapping_stored = match self
            .mappings
            .put(
                &created.bill_code,
                &bill.driver_id,
                bill.amount,
                &bill.reference,
                &form.external_reference_no,
            )
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(
                    bill_code = %created.bill_code,
                    driver_id = %bill.driver_id,
                    error = %e,
                    "bill created but mapping was not stored"
                );
                false
            }
        };

        info!(
            bill_code = %created.bill_code,
            payment_url = %created.payment_url,
            mapping_stored,
            "✅ bill ready for payment"
        );

        Ok(CreateBillResponse {
            success: true,
            bill_code: created.bill_code,
            payment_url: created.payment_url,
            external_reference_no: form.external_reference_no,
            mapping_stored,
            message: "Bill created successfully".to_string(),
        })
    }

    fn build_form(
        &self,
        request: &CreateBillRequest,
        bill: &ValidatedBill,
        external_reference_no: &str,
    ) -> Result<BillForm, AppError> {
        let defaults = &self.config.bill_defaults;

        let bill_to = non_blank(&request.bill_to).unwrap_or(&bill.driver_id);
        let default_email = format!("{}@{}", bill.driver_id, defaults.email_domain);
        let bill_email = non_blank(&request.bill_email).unwrap_or(&default_email);
        if !looks_like_email(bill_email) {
            warn!(bill_email, "bill email does not look like an email address");
        }

        let bill_amount_cents = amount_to_cents(bill.amount).ok_or_else(|| {
            out_of_range(&format_amount(bill.amount))
        })?;

        Ok(BillForm {
            bill_name: truncate_field(
                "billName",
                non_blank(&request.bill_name).unwrap_or(&defaults.bill_name),
                MAX_TEXT_LEN,
            ),
            bill_description: truncate_field(
                "billDescription",
                non_blank(&request.bill_description).unwrap_or(&defaults.bill_description),
                MAX_TEXT_LEN,
            ),
            bill_to: truncate_field("billTo", bill_to, MAX_TEXT_LEN),
            bill_email: truncate_field("billEmail", bill_email, MAX_TEXT_LEN),
            bill_phone: truncate_field(
                "billPhone",
                &sanitize_phone(request.bill_phone.as_deref(), &defaults.phone),
                MAX_PHONE_LEN,
            ),
            bill_amount_cents,
            return_url: non_blank(&request.return_url)
                .or(self.config.default_return_url.as_deref())
                .unwrap_or_default()
                .to_string(),
            callback_url: non_blank(&request.callback_url)
                .or(self.config.default_callback_url.as_deref())
                .unwrap_or_default()
                .to_string(),
            external_reference_no: truncate_field(
                "billExternalReferenceNo",
                external_reference_no,
                reference::MAX_LEN,
            ),
            content_email: CONTENT_EMAIL.to_string(),
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn out_of_range(amount: &str) -> AppError {
    AppError::new(AppErrorKind::Validation(ValidationError::AmountOutOfRange {
        amount: amount.to_string(),
        min: format_amount(MIN_BILL_AMOUNT),
        max: format_amount(MAX_BILL_AMOUNT),
    }))
}

/// Required fields first, then the amount range
fn validate(request: &CreateBillRequest) -> Result<ValidatedBill, AppError> {
    let amount_present = match &request.amount {
        None | Some(JsonValue::Null) => false,
        Some(JsonValue::String(s)) => !s.trim().is_empty(),
        Some(value) => parse_amount(value).map_or(true, |a| !a.is_zero()),
    };

    let mut missing = Vec::new();
    if !amount_present {
        missing.push("amount");
    }
    if non_blank(&request.driver_id).is_none() {
        missing.push("driverId");
    }
    if non_blank(&request.reference).is_none() {
        missing.push("reference");
    }
    if !missing.is_empty() {
        return Err(AppError::missing_fields(missing));
    }

    let driver_id = non_blank(&request.driver_id).unwrap_or_default();
    if !keys::is_valid_key(driver_id) {
        return Err(AppError::new(AppErrorKind::Validation(
            ValidationError::InvalidField {
                field: "driverId".to_string(),
                reason: "must not contain '/', '.', '#', '$', '[', ']' or control characters"
                    .to_string(),
            },
        )));
    }

    let raw_amount = request.amount.clone().unwrap_or(JsonValue::Null);
    let amount = match parse_amount(&raw_amount) {
        Some(a) if a >= MIN_BILL_AMOUNT && a <= MAX_BILL_AMOUNT => a,
        Some(a) => return Err(out_of_range(&format_amount(a))),
        None => {
            let shown = match &raw_amount {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(out_of_range(&shown));
        }
    };

    Ok(ValidatedBill {
        amount,
        driver_id: driver_id.to_string(),
        reference: non_blank(&request.reference).unwrap_or_default().to_string(),
    })
}
