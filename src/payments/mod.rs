pub mod error;
pub mod provider;
pub mod providers;
pub mod reference;
pub mod types;
pub mod utils;

pub use error::{PaymentError, PaymentResult};
pub use provider::BillGateway;
pub use types::{BillForm, CreatedBill};
pub use providers::ToyyibPayGateway;
