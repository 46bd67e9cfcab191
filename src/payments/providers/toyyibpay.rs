use crate::config::GatewayConfig;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::BillGateway;
use crate::payments::types::{BillForm, CreatedBill};
use crate::payments::utils::{parse_create_bill_response, payment_url, GatewayHttpClient};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

/// Wire form of the bill creation request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBillRequest<'a> {
    user_secret_key: &'a str,
    category_code: &'a str,
    bill_name: &'a str,
    bill_description: &'a str,
    bill_price_setting: u8,
    bill_payor_info: u8,
    bill_amount: i64,
    bill_return_url: &'a str,
    bill_callback_url: &'a str,
    bill_external_reference_no: &'a str,
    bill_to: &'a str,
    bill_email: &'a str,
    bill_phone: &'a str,
    bill_split_payment: u8,
    bill_split_payment_args: &'a str,
    bill_payment_channel: &'a str,
    bill_content_email: &'a str,
}

pub struct ToyyibPayGateway {
    config: GatewayConfig,
    http: GatewayHttpClient,
}

impl ToyyibPayGateway {
    pub fn new(config: GatewayConfig) -> PaymentResult<Self> {
        let http = GatewayHttpClient::new(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, http })
    }

    fn request<'a>(&'a self, form: &'a BillForm) -> CreateBillRequest<'a> {
        CreateBillRequest {
            user_secret_key: &self.config.user_secret_key,
            category_code: &self.config.category_code,
            bill_name: &form.bill_name,
            bill_description: &form.bill_description,
            bill_price_setting: 1,
            bill_payor_info: 1,
            bill_amount: form.bill_amount_cents,
            bill_return_url: &form.return_url,
            bill_callback_url: &form.callback_url,
            bill_external_reference_no: &form.external_reference_no,
            bill_to: &form.bill_to,
            bill_email: &form.bill_email,
            bill_phone: &form.bill_phone,
            bill_split_payment: 0,
            bill_split_payment_args: "",
            bill_payment_channel: "0",
            bill_content_email: &form.content_email,
        }
    }
}

#[async_trait]
impl BillGateway for ToyyibPayGateway {
    async fn create_bill(&self, form: &BillForm) -> PaymentResult<CreatedBill> {
        if self.config.user_secret_key.trim().is_empty() || self.config.category_code.trim().is_empty()
        {
            return Err(PaymentError::ValidationError {
                message: "gateway credentials are not configured".to_string(),
                field: Some("userSecretKey".to_string()),
            });
        }

        let url = self.config.create_bill_url();
        info!(
            environment = self.config.environment.as_str(),
            url = %url,
            secret_key = %self.config.secret_key_preview(),
            category_code = %self.config.category_code,
            amount_cents = form.bill_amount_cents,
            external_reference_no = %form.external_reference_no,
            "📤 creating bill"
        );

        let (status, text) = self.http.post_form(&url, &self.request(form)).await?;

        match parse_create_bill_response(&text, &self.config.base_url) {
            Ok(bill) => {
                info!(bill_code = %bill.bill_code, status, "✅ bill created");
                Ok(bill)
            }
            Err(e) => {
                error!(
                    status,
                    error = %e,
                    raw = %text,
                    "gateway refused bill creation"
                );
                Err(e)
            }
        }
    }

    fn payment_url(&self, bill_code: &str) -> String {
        payment_url(&self.config.base_url, bill_code)
    }

    fn environment(&self) -> &'static str {
        self.config.environment.as_str()
    }
}
