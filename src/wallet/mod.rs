//! Developer wallet transactions
//!
//! - [`WalletLedger`]: credit/debit submission and cached balance reads
//! - [`WalletGuard`]: debit pre-check and balance cache refresh around sync
//! - [`WalletBalanceStore`]: local balance cache

pub mod ledger;
pub mod store;

pub use ledger::{WalletGuard, WalletLedger};
pub use store::{MemoryWalletBalanceStore, PgWalletBalanceStore, WalletBalanceStore};
