use sea_orm_migration::prelude::Iden;

/// Committed membership intervals. Uniqueness key is
/// `(source_id, subject_id, property, object_id, start_time)`.
#[derive(Iden, Clone, Copy)]
pub enum Membership {
    Table,
    SubjectId,
    Property,
    ObjectId,
    SourceId,
    StartTime,
    EndTime,
}

/// Pending additions and deletions, keyed by transaction id. Rows here are
/// invisible to readers that do not carry the transaction id.
#[derive(Iden, Clone, Copy)]
pub enum MembershipTxOperations {
    Table,
    SubjectId,
    Property,
    ObjectId,
    SourceId,
    StartTime,
    EndTime,
    TxId,
    Operation,
    ForceFlag,
}

/// Marker stored in the staging `operation` column.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxOperation {
    Add,
    Delete,
}

impl TxOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            TxOperation::Add => "add",
            TxOperation::Delete => "delete",
        }
    }
}

/// Value stored in `force_flag` for deletes that remove the committed row
/// outright instead of end-dating it.
pub const FORCE_FLAG: &str = "force";
