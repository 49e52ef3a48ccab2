// Thin re-export module: implementation is split across `blockchain/` to keep
// block structure, account state, validation and chain management separate.

pub mod accounts;
pub mod block;
pub mod chain;
pub mod validation;

pub use accounts::*;
pub use block::*;
pub use chain::*;
pub use validation::*;
