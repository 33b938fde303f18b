pub mod auth;
pub mod backup;
pub mod balances;
pub mod core;
pub mod fees;
pub mod receipts;
pub mod reports;
pub mod setup;
