/// Validation logic for transactions separated from type definitions
use crate::blockchain::AccountLedger;
use crate::crypto::{sha3_256, verify_signature};
use crate::error::TransactionError;
use crate::mempool::Mempool;
use crate::transaction::types::Transaction;

impl Transaction {
    /// Stateless check: the signature must verify under the attached public
    /// key, and that key must hash to the sender address. Useful for early
    /// rejection before any ledger access.
    pub fn validate_signature(&self) -> Result<(), TransactionError> {
        if self.signature.is_empty() || self.public_key.is_empty() {
            return Err(TransactionError::BadSignature);
        }

        if sha3_256(&self.public_key) != self.sender {
            return Err(TransactionError::SenderMismatch);
        }

        verify_signature(&self.public_key, &self.signable_message(), &self.signature)
            .map_err(|_| TransactionError::BadSignature)
    }

    /// Checks that the sender's spendable balance covers amount plus fee.
    /// Locked mining rewards do not spend.
    pub fn validate_spendable(&self, ledger: &AccountLedger) -> Result<(), TransactionError> {
        let cost = self
            .amount
            .checked_add(self.fee())
            .ok_or(TransactionError::InsufficientBalance)?;

        if ledger.spendable(&self.sender) < cost {
            return Err(TransactionError::InsufficientBalance);
        }
        Ok(())
    }

    /// Full admission check used on every ingestion path: signature, balance
    /// and the one-pending-per-sender rule. A transaction already sitting in
    /// the pool does not conflict with itself.
    pub fn validate(&self, ledger: &AccountLedger, pool: &Mempool) -> Result<(), TransactionError> {
        self.validate_signature()?;
        self.validate_spendable(ledger)?;

        if !pool.no_other_pending_from(&self.sender, &self.id()) {
            return Err(TransactionError::ConflictingPending);
        }
        Ok(())
    }
}
