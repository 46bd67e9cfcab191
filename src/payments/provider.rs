use crate::payments::error::PaymentResult;
use crate::payments::types::{BillForm, CreatedBill};
use async_trait::async_trait;

#[async_trait]
pub trait BillGateway: Send + Sync {
    async fn create_bill(&self, form: &BillForm) -> PaymentResult<CreatedBill>;

    /// Hosted payment page for a bill
    fn payment_url(&self, bill_code: &str) -> String;

    fn environment(&self) -> &'static str;
}
