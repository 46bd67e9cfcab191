//! Services module for business logic

pub mod bill_creation;
pub mod callback_fields;
pub mod callback_reconciler;
pub mod payment_recovery;
pub mod retry;

pub use bill_creation::{BillCreationService, CreateBillRequest, CreateBillResponse};
pub use callback_fields::{CallbackField, CallbackPayload};
pub use callback_reconciler::{CallbackAck, CallbackReconciler, SettlementOutcome};
pub use payment_recovery::PaymentRecoveryService;
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
#[cfg(any(test, feature = "test-util"))]
pub use retry::RecordingSleeper;
