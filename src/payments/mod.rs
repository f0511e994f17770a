//! Payment gateway integration module
//!
//! This module adapts the host framework's gateway interface to M-Pesa's
//! push-payment API for mobile-money checkouts in Kenya.

pub mod plugin;
pub mod providers;
pub mod traits;
pub mod types;
