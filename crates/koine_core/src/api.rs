use async_trait::async_trait;

use crate::{KoineResult, MembershipTriple, ResourceId, Timestamp};

/// Staging mutations. Every call requires a transaction id, runs inside one
/// store-level transaction, and is safe to retry if the store aborts.
#[async_trait]
pub trait MembershipWriteApi {
    /// Stages an addition, first withdrawing any pending delete for the same
    /// identity key in the same transaction.
    async fn add_membership(
        &self,
        tx_id: &str,
        source_id: &ResourceId,
        membership: &MembershipTriple,
        start_time: Timestamp,
    ) -> KoineResult<()>;

    /// Stages an addition with an explicit end instant. `None` means the
    /// triple stays asserted until ended.
    async fn add_membership_with_end(
        &self,
        tx_id: &str,
        source_id: &ResourceId,
        membership: &MembershipTriple,
        start_time: Timestamp,
        end_time: Option<Timestamp>,
    ) -> KoineResult<()>;

    /// Ends one triple: withdraws it if it was added in this transaction,
    /// otherwise stages an end-dating of the live committed row. Ending a
    /// triple with no live committed match is a no-op.
    async fn end_membership(
        &self,
        tx_id: &str,
        source_id: &ResourceId,
        membership: &MembershipTriple,
        end_time: Timestamp,
    ) -> KoineResult<()>;

    /// Ends every live triple produced by the source.
    async fn end_membership_for_source(
        &self,
        tx_id: &str,
        source_id: &ResourceId,
        end_time: Timestamp,
    ) -> KoineResult<()>;

    /// Stages hard deletes for every committed row of the source active at
    /// or after the given instant; `None` selects all history.
    async fn delete_membership_for_source_after(
        &self,
        tx_id: &str,
        source_id: &ResourceId,
        after_time: Option<Timestamp>,
    ) -> KoineResult<()>;

    /// Purges every staged and committed row that references the target as
    /// source, subject, or object.
    async fn delete_membership_references(
        &self,
        tx_id: &str,
        target_id: &ResourceId,
    ) -> KoineResult<()>;
}

/// Queries over the union of committed state and one transaction's staging.
#[async_trait]
pub trait MembershipReadApi {
    /// Returns the membership triples visible for the subject under the
    /// given transaction; `None` sees only committed state. A
    /// memento-qualified subject selects the historical view at its instant.
    /// The returned subjects carry the base id.
    async fn get_membership(
        &self,
        tx_id: Option<&str>,
        subject_id: &ResourceId,
    ) -> KoineResult<Vec<MembershipTriple>>;

    /// Streams every committed row to the log sink. Debugging only.
    async fn log_membership(&self) -> KoineResult<()>;

    /// Streams every staging row to the log sink. Debugging only.
    async fn log_operations(&self) -> KoineResult<()>;
}

/// Commit protocol for staged operations.
#[async_trait]
pub trait MembershipTxApi {
    /// Drains the transaction's staging rows into the committed relation:
    /// force deletes, then end-dates, then deduplicated adds, then purges
    /// the staging rows.
    async fn commit_transaction(&self, tx_id: &str) -> KoineResult<()>;

    /// Rolls back by dropping the transaction's staging rows. Committed
    /// rows are untouched.
    async fn delete_transaction(&self, tx_id: &str) -> KoineResult<()>;

    /// Empties both relations. Test and administrative use only.
    async fn clear_index(&self) -> KoineResult<()>;
}
