//! Transaction Coordinator.
//!
//! At most one local transaction per document is in flight. Callers that are
//! already inside one receive its token and must reuse it; only the code that
//! called [`TxnCoordinator::begin`] may commit or abort.

use tracing::{debug, trace};

use crate::doc::{DocError, DocumentStore, TransactionSummary, TxnToken};

#[derive(Debug, Default)]
pub struct TxnCoordinator {
    in_flight: Option<u64>,
    committed: u64,
    aborted: u64,
}

impl TxnCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin<D: DocumentStore + ?Sized>(&mut self, doc: &mut D) -> Result<TxnToken, DocError> {
        if let Some(open) = self.in_flight {
            return Err(DocError::TransactionInFlight { open });
        }
        let txn = doc.begin()?;
        trace!(txn = txn.id(), "transaction opened");
        self.in_flight = Some(txn.id());
        Ok(txn)
    }

    pub fn commit<D: DocumentStore + ?Sized>(
        &mut self,
        doc: &mut D,
        txn: TxnToken,
    ) -> Result<TransactionSummary, DocError> {
        self.release(&txn)?;
        let id = txn.id();
        let summary = doc.commit(txn)?;
        self.committed += 1;
        trace!(
            txn = id,
            changed = summary.changed_state(),
            "transaction committed"
        );
        Ok(summary)
    }

    pub fn abort<D: DocumentStore + ?Sized>(
        &mut self,
        doc: &mut D,
        txn: TxnToken,
    ) -> Result<(), DocError> {
        self.release(&txn)?;
        let id = txn.id();
        doc.abort(txn)?;
        self.aborted += 1;
        debug!(txn = id, "transaction aborted");
        Ok(())
    }

    fn release(&mut self, txn: &TxnToken) -> Result<(), DocError> {
        match self.in_flight {
            None => Err(DocError::NoTransaction),
            Some(open) if open != txn.id() => Err(DocError::ForeignTransaction {
                open,
                got: txn.id(),
            }),
            Some(_) => {
                self.in_flight = None;
                Ok(())
            }
        }
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    pub fn committed(&self) -> u64 {
        self.committed
    }

    pub fn aborted(&self) -> u64 {
        self.aborted
    }
}
