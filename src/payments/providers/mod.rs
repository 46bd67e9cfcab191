pub mod toyyibpay;

pub use toyyibpay::ToyyibPayGateway;
