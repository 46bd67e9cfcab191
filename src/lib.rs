//! Bill gateway and commission ledger relay for ride-hailing drivers.
//!
//! Drivers pay outstanding commission through a ToyyibPay bill. The relay
//! creates the bill, remembers which driver and amount it belongs to, and
//! settles the driver's commission ledger in a Firebase Realtime Database when
//! the gateway calls back.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
