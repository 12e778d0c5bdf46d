use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info};
use sea_orm::sea_query::{
    Alias, DeleteStatement, Expr, ExprTrait, MysqlQueryBuilder, PostgresQueryBuilder, Query,
    QueryStatementWriter, SelectStatement, SqliteQueryBuilder, UnionType,
};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement, TransactionTrait, sea_query,
};
use sea_orm_migration::MigratorTrait;

use koine_core::{
    IndexConfig, KoineError, KoineResult, MembershipReadApi, MembershipTriple, MembershipTxApi,
    MembershipWriteApi, ResourceId, Timestamp,
};

use crate::db::{FORCE_FLAG, Membership, MembershipTxOperations, TxOperation};
use crate::migration::Migrator;
use crate::platform::DbPlatform;

/// Manager for the membership index.
///
/// Owns the committed `membership` relation and the `membership_tx_operations`
/// staging relation. Atomicity, isolation, and durability are delegated to
/// the backing store; every mutating operation runs inside one store-level
/// transaction, so a logical operation either lands fully or not at all.
pub struct MembershipIndex {
    conn: DatabaseConnection,
    platform: DbPlatform,
}

impl MembershipIndex {
    /// Connects a pool per the configuration, detects the platform, and
    /// applies the index schema.
    pub async fn connect(config: &IndexConfig, base_dir: &Path) -> KoineResult<Self> {
        let url = build_connection_url(config, base_dir)?;
        let mut options = ConnectOptions::new(url);
        if let Some(pool) = &config.pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        let conn = Database::connect(options).await.map_err(KoineError::from)?;
        Self::attach(conn).await
    }

    /// Wraps an externally owned connection pool. Connections are borrowed
    /// per operation and never retained.
    pub async fn attach(conn: DatabaseConnection) -> KoineResult<Self> {
        let platform = DbPlatform::detect(&conn).await?;
        debug!("applying membership index schema for {}", platform.as_str());
        Migrator::up(&conn, None).await.map_err(KoineError::from)?;
        Ok(Self { conn, platform })
    }

    pub fn platform(&self) -> DbPlatform {
        self.platform
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    async fn insert_add_row<C: ConnectionTrait>(
        &self,
        conn: &C,
        tx_id: &str,
        source_id: &ResourceId,
        membership: &MembershipTriple,
        start_time: Timestamp,
        end_time: Option<Timestamp>,
    ) -> KoineResult<()> {
        let end_time = end_time.unwrap_or(Timestamp::NO_END);
        let mut insert = Query::insert()
            .into_table(MembershipTxOperations::Table)
            .columns([
                MembershipTxOperations::SubjectId,
                MembershipTxOperations::Property,
                MembershipTxOperations::ObjectId,
                MembershipTxOperations::SourceId,
                MembershipTxOperations::StartTime,
                MembershipTxOperations::EndTime,
                MembershipTxOperations::TxId,
                MembershipTxOperations::Operation,
            ])
            .to_owned();
        insert
            .values([
                Expr::val(membership.subject.as_str()).into(),
                Expr::val(membership.property.as_str()).into(),
                Expr::val(membership.object.as_str()).into(),
                Expr::val(source_id.full_id()).into(),
                Expr::val(start_time.as_secs()).into(),
                Expr::val(end_time.as_secs()).into(),
                Expr::val(tx_id).into(),
                Expr::val(TxOperation::Add.as_str()).into(),
            ])
            .map_err(|err| KoineError::storage(err.to_string()))?;
        exec(conn, &insert).await?;
        Ok(())
    }

    /// The single-live-row invariant is load-bearing for end-dating; a
    /// second live row for one identity key means the committed relation is
    /// corrupt, so surface it instead of silently end-dating both.
    async fn check_single_live<C: ConnectionTrait>(
        &self,
        conn: &C,
        source_id: &ResourceId,
        membership: &MembershipTriple,
    ) -> KoineResult<()> {
        let select = Query::select()
            .column(Membership::StartTime)
            .from(Membership::Table)
            .and_where(Expr::col(Membership::SourceId).eq(source_id.full_id()))
            .and_where(Expr::col(Membership::SubjectId).eq(membership.subject.as_str()))
            .and_where(Expr::col(Membership::Property).eq(membership.property.as_str()))
            .and_where(Expr::col(Membership::ObjectId).eq(membership.object.as_str()))
            .and_where(Expr::col(Membership::EndTime).eq(Timestamp::NO_END.as_secs()))
            .to_owned();
        let live = query_all(conn, &select).await?;
        if live.len() > 1 {
            error!(
                "{} live membership rows for source={} subject={} property={} object={}",
                live.len(),
                source_id.full_id(),
                membership.subject,
                membership.property,
                membership.object
            );
            return Err(KoineError::invariant(format!(
                "{} live membership rows for one identity key",
                live.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MembershipWriteApi for MembershipIndex {
    async fn add_membership(
        &self,
        tx_id: &str,
        source_id: &ResourceId,
        membership: &MembershipTriple,
        start_time: Timestamp,
    ) -> KoineResult<()> {
        let txn = self.conn.begin().await?;
        // A delete staged earlier in this transaction is cancelled out by
        // the add, so the pair nets to the pre-existing committed state.
        exec(
            &txn,
            &clear_entry_stmt(tx_id, source_id, membership, TxOperation::Delete),
        )
        .await?;
        self.insert_add_row(&txn, tx_id, source_id, membership, start_time, None)
            .await?;
        txn.commit().await?;
        Ok(())
    }

    async fn add_membership_with_end(
        &self,
        tx_id: &str,
        source_id: &ResourceId,
        membership: &MembershipTriple,
        start_time: Timestamp,
        end_time: Option<Timestamp>,
    ) -> KoineResult<()> {
        let txn = self.conn.begin().await?;
        self.insert_add_row(&txn, tx_id, source_id, membership, start_time, end_time)
            .await?;
        txn.commit().await?;
        Ok(())
    }

    async fn end_membership(
        &self,
        tx_id: &str,
        source_id: &ResourceId,
        membership: &MembershipTriple,
        end_time: Timestamp,
    ) -> KoineResult<()> {
        let txn = self.conn.begin().await?;
        let withdrawn = exec(
            &txn,
            &clear_entry_stmt(tx_id, source_id, membership, TxOperation::Add),
        )
        .await?;
        // Nothing withdrawn means the triple was committed earlier; stage an
        // end-dating of the live row, copying its start instant.
        if withdrawn == 0 {
            self.check_single_live(&txn, source_id, membership).await?;
            let select = Query::select()
                .column(Membership::SubjectId)
                .column(Membership::Property)
                .column(Membership::ObjectId)
                .column(Membership::SourceId)
                .column(Membership::StartTime)
                .expr(Expr::val(end_time.as_secs()))
                .expr(Expr::val(tx_id))
                .expr(Expr::val(TxOperation::Delete.as_str()))
                .from(Membership::Table)
                .and_where(Expr::col(Membership::SourceId).eq(source_id.full_id()))
                .and_where(Expr::col(Membership::EndTime).eq(Timestamp::NO_END.as_secs()))
                .and_where(Expr::col(Membership::SubjectId).eq(membership.subject.as_str()))
                .and_where(Expr::col(Membership::Property).eq(membership.property.as_str()))
                .and_where(Expr::col(Membership::ObjectId).eq(membership.object.as_str()))
                .to_owned();
            let insert = staging_insert_from(select, false)?;
            exec(&txn, &insert).await?;
        }
        txn.commit().await?;
        Ok(())
    }

    async fn end_membership_for_source(
        &self,
        tx_id: &str,
        source_id: &ResourceId,
        end_time: Timestamp,
    ) -> KoineResult<()> {
        let txn = self.conn.begin().await?;
        exec(&txn, &clear_adds_for_source_stmt(tx_id, source_id)).await?;

        let m = Alias::new("m");
        let mtx = Alias::new("mtx");
        // Guard against a second end-dating when another transaction has
        // already staged a delete for the same row.
        let already_deleted = Query::select()
            .expr(Expr::val(1))
            .from_as(MembershipTxOperations::Table, mtx.clone())
            .and_where(
                Expr::col((mtx.clone(), MembershipTxOperations::SubjectId))
                    .equals((m.clone(), Membership::SubjectId)),
            )
            .and_where(
                Expr::col((mtx.clone(), MembershipTxOperations::Property))
                    .equals((m.clone(), Membership::Property)),
            )
            .and_where(
                Expr::col((mtx.clone(), MembershipTxOperations::ObjectId))
                    .equals((m.clone(), Membership::ObjectId)),
            )
            .and_where(
                Expr::col((mtx.clone(), MembershipTxOperations::SourceId))
                    .equals((m.clone(), Membership::SourceId)),
            )
            .and_where(
                Expr::col((mtx.clone(), MembershipTxOperations::Operation))
                    .eq(TxOperation::Delete.as_str()),
            )
            .to_owned();
        let select = Query::select()
            .column((m.clone(), Membership::SubjectId))
            .column((m.clone(), Membership::Property))
            .column((m.clone(), Membership::ObjectId))
            .column((m.clone(), Membership::SourceId))
            .column((m.clone(), Membership::StartTime))
            .expr(Expr::val(end_time.as_secs()))
            .expr(Expr::val(tx_id))
            .expr(Expr::val(TxOperation::Delete.as_str()))
            .from_as(Membership::Table, m.clone())
            .and_where(Expr::col((m.clone(), Membership::SourceId)).eq(source_id.full_id()))
            .and_where(
                Expr::col((m.clone(), Membership::EndTime)).eq(Timestamp::NO_END.as_secs()),
            )
            .and_where(Expr::exists(already_deleted).not())
            .to_owned();
        let insert = staging_insert_from(select, false)?;
        exec(&txn, &insert).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn delete_membership_for_source_after(
        &self,
        tx_id: &str,
        source_id: &ResourceId,
        after_time: Option<Timestamp>,
    ) -> KoineResult<()> {
        let txn = self.conn.begin().await?;
        exec(&txn, &clear_adds_for_source_stmt(tx_id, source_id)).await?;

        let after = after_time.unwrap_or(Timestamp::NO_START);
        // Rows still active at the cut-off are caught by end_time; rows
        // born after it by start_time. The original end instant rides along
        // so commit can skip end-dating what it is about to erase.
        let select = Query::select()
            .column(Membership::SubjectId)
            .column(Membership::Property)
            .column(Membership::ObjectId)
            .column(Membership::SourceId)
            .column(Membership::StartTime)
            .column(Membership::EndTime)
            .expr(Expr::val(tx_id))
            .expr(Expr::val(TxOperation::Delete.as_str()))
            .expr(Expr::val(FORCE_FLAG))
            .from(Membership::Table)
            .and_where(Expr::col(Membership::SourceId).eq(source_id.full_id()))
            .and_where(
                Expr::col(Membership::StartTime)
                    .gte(after.as_secs())
                    .or(Expr::col(Membership::EndTime).gte(after.as_secs())),
            )
            .to_owned();
        let insert = staging_insert_from(select, true)?;
        exec(&txn, &insert).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn delete_membership_references(
        &self,
        tx_id: &str,
        target_id: &ResourceId,
    ) -> KoineResult<()> {
        let target = target_id.full_id();
        let txn = self.conn.begin().await?;
        let staged = Query::delete()
            .from_table(MembershipTxOperations::Table)
            .and_where(Expr::col(MembershipTxOperations::TxId).eq(tx_id))
            .and_where(
                Expr::col(MembershipTxOperations::SourceId)
                    .eq(target.as_str())
                    .or(Expr::col(MembershipTxOperations::SubjectId).eq(target.as_str()))
                    .or(Expr::col(MembershipTxOperations::ObjectId).eq(target.as_str())),
            )
            .to_owned();
        exec(&txn, &staged).await?;
        let committed = Query::delete()
            .from_table(Membership::Table)
            .and_where(
                Expr::col(Membership::SourceId)
                    .eq(target.as_str())
                    .or(Expr::col(Membership::SubjectId).eq(target.as_str()))
                    .or(Expr::col(Membership::ObjectId).eq(target.as_str())),
            )
            .to_owned();
        exec(&txn, &committed).await?;
        txn.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl MembershipTxApi for MembershipIndex {
    async fn commit_transaction(&self, tx_id: &str) -> KoineResult<()> {
        let txn = self.conn.begin().await?;

        let purged = exec(&txn, &commit_deletes_stmt(tx_id)).await?;
        let ends = txn
            .execute(self.platform.commit_ends_statement(tx_id))
            .await
            .map_err(KoineError::from)?
            .rows_affected();
        let adds = exec(&txn, &commit_adds_stmt(tx_id)?).await?;
        let cleaned = exec(&txn, &delete_transaction_stmt(tx_id)).await?;

        txn.commit().await?;
        debug!("completed commit of {tx_id}: {purged} purged, {ends} ended, {adds} adds, {cleaned} operations");
        Ok(())
    }

    async fn delete_transaction(&self, tx_id: &str) -> KoineResult<()> {
        exec(&self.conn, &delete_transaction_stmt(tx_id)).await?;
        Ok(())
    }

    async fn clear_index(&self) -> KoineResult<()> {
        let txn = self.conn.begin().await?;
        exec(
            &txn,
            &Query::delete().from_table(Membership::Table).to_owned(),
        )
        .await?;
        exec(
            &txn,
            &Query::delete()
                .from_table(MembershipTxOperations::Table)
                .to_owned(),
        )
        .await?;
        txn.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl MembershipReadApi for MembershipIndex {
    async fn get_membership(
        &self,
        tx_id: Option<&str>,
        subject_id: &ResourceId,
    ) -> KoineResult<Vec<MembershipTriple>> {
        let query = match subject_id.memento_instant() {
            Some(instant) => membership_memento_query(tx_id, subject_id, instant),
            None => membership_live_query(tx_id, subject_id),
        };
        let rows = query_all(&self.conn, &query).await?;
        let subject = subject_id.base_id();
        let mut triples = Vec::with_capacity(rows.len());
        for row in rows {
            let property: String = row.try_get("", &col_name(Membership::Property))?;
            let object: String = row.try_get("", &col_name(Membership::ObjectId))?;
            triples.push(MembershipTriple::new(subject, property, object));
        }
        Ok(triples)
    }

    async fn log_membership(&self) -> KoineResult<()> {
        info!("source_id, subject_id, property, object_id, start_time, end_time");
        let select = Query::select()
            .column(Membership::SourceId)
            .column(Membership::SubjectId)
            .column(Membership::Property)
            .column(Membership::ObjectId)
            .column(Membership::StartTime)
            .column(Membership::EndTime)
            .from(Membership::Table)
            .to_owned();
        for row in query_all(&self.conn, &select).await? {
            let source: String = row.try_get("", &col_name(Membership::SourceId))?;
            let subject: String = row.try_get("", &col_name(Membership::SubjectId))?;
            let property: String = row.try_get("", &col_name(Membership::Property))?;
            let object: String = row.try_get("", &col_name(Membership::ObjectId))?;
            let start: i64 = row.try_get("", &col_name(Membership::StartTime))?;
            let end: i64 = row.try_get("", &col_name(Membership::EndTime))?;
            info!(
                "{source}, {subject}, {property}, {object}, {}, {}",
                Timestamp::from_secs(start),
                Timestamp::from_secs(end)
            );
        }
        Ok(())
    }

    async fn log_operations(&self) -> KoineResult<()> {
        info!("source_id, subject_id, property, object_id, start_time, end_time, tx_id, operation, force_flag");
        let select = Query::select()
            .column(MembershipTxOperations::SourceId)
            .column(MembershipTxOperations::SubjectId)
            .column(MembershipTxOperations::Property)
            .column(MembershipTxOperations::ObjectId)
            .column(MembershipTxOperations::StartTime)
            .column(MembershipTxOperations::EndTime)
            .column(MembershipTxOperations::TxId)
            .column(MembershipTxOperations::Operation)
            .column(MembershipTxOperations::ForceFlag)
            .from(MembershipTxOperations::Table)
            .to_owned();
        for row in query_all(&self.conn, &select).await? {
            let source: String = row.try_get("", &col_name(MembershipTxOperations::SourceId))?;
            let subject: String = row.try_get("", &col_name(MembershipTxOperations::SubjectId))?;
            let property: String = row.try_get("", &col_name(MembershipTxOperations::Property))?;
            let object: String = row.try_get("", &col_name(MembershipTxOperations::ObjectId))?;
            let start: i64 = row.try_get("", &col_name(MembershipTxOperations::StartTime))?;
            let end: i64 = row.try_get("", &col_name(MembershipTxOperations::EndTime))?;
            let tx: String = row.try_get("", &col_name(MembershipTxOperations::TxId))?;
            let operation: String = row.try_get("", &col_name(MembershipTxOperations::Operation))?;
            let force: Option<String> =
                row.try_get("", &col_name(MembershipTxOperations::ForceFlag))?;
            info!(
                "{source}, {subject}, {property}, {object}, {}, {}, {tx}, {operation}, {}",
                Timestamp::from_secs(start),
                Timestamp::from_secs(end),
                force.as_deref().unwrap_or("-")
            );
        }
        Ok(())
    }
}

/// Removes one staged entry for the identity key in the transaction,
/// leaving force deletes in place.
fn clear_entry_stmt(
    tx_id: &str,
    source_id: &ResourceId,
    membership: &MembershipTriple,
    operation: TxOperation,
) -> DeleteStatement {
    Query::delete()
        .from_table(MembershipTxOperations::Table)
        .and_where(Expr::col(MembershipTxOperations::SourceId).eq(source_id.full_id()))
        .and_where(Expr::col(MembershipTxOperations::TxId).eq(tx_id))
        .and_where(Expr::col(MembershipTxOperations::SubjectId).eq(membership.subject.as_str()))
        .and_where(Expr::col(MembershipTxOperations::Property).eq(membership.property.as_str()))
        .and_where(Expr::col(MembershipTxOperations::ObjectId).eq(membership.object.as_str()))
        .and_where(Expr::col(MembershipTxOperations::Operation).eq(operation.as_str()))
        .and_where(Expr::col(MembershipTxOperations::ForceFlag).is_null())
        .to_owned()
}

fn clear_adds_for_source_stmt(tx_id: &str, source_id: &ResourceId) -> DeleteStatement {
    Query::delete()
        .from_table(MembershipTxOperations::Table)
        .and_where(Expr::col(MembershipTxOperations::SourceId).eq(source_id.full_id()))
        .and_where(Expr::col(MembershipTxOperations::TxId).eq(tx_id))
        .and_where(Expr::col(MembershipTxOperations::Operation).eq(TxOperation::Add.as_str()))
        .to_owned()
}

/// Wraps a staging-row select into the matching INSERT; `with_force` adds
/// the force_flag column, whose value must then be the select's last
/// expression.
fn staging_insert_from(
    select: SelectStatement,
    with_force: bool,
) -> KoineResult<sea_query::InsertStatement> {
    let mut columns = vec![
        MembershipTxOperations::SubjectId,
        MembershipTxOperations::Property,
        MembershipTxOperations::ObjectId,
        MembershipTxOperations::SourceId,
        MembershipTxOperations::StartTime,
        MembershipTxOperations::EndTime,
        MembershipTxOperations::TxId,
        MembershipTxOperations::Operation,
    ];
    if with_force {
        columns.push(MembershipTxOperations::ForceFlag);
    }
    let mut insert = Query::insert()
        .into_table(MembershipTxOperations::Table)
        .columns(columns)
        .to_owned();
    insert
        .select_from(select)
        .map_err(|err| KoineError::storage(err.to_string()))?;
    Ok(insert)
}

fn commit_deletes_stmt(tx_id: &str) -> DeleteStatement {
    let mto = Alias::new("mto");
    let forced = Query::select()
        .expr(Expr::val(1))
        .from_as(MembershipTxOperations::Table, mto.clone())
        .and_where(Expr::col((mto.clone(), MembershipTxOperations::TxId)).eq(tx_id))
        .and_where(
            Expr::col((mto.clone(), MembershipTxOperations::Operation))
                .eq(TxOperation::Delete.as_str()),
        )
        .and_where(Expr::col((mto.clone(), MembershipTxOperations::ForceFlag)).eq(FORCE_FLAG))
        .and_where(
            Expr::col((Membership::Table, Membership::SourceId))
                .equals((mto.clone(), MembershipTxOperations::SourceId)),
        )
        .and_where(
            Expr::col((Membership::Table, Membership::SubjectId))
                .equals((mto.clone(), MembershipTxOperations::SubjectId)),
        )
        .and_where(
            Expr::col((Membership::Table, Membership::Property))
                .equals((mto.clone(), MembershipTxOperations::Property)),
        )
        .and_where(
            Expr::col((Membership::Table, Membership::ObjectId))
                .equals((mto.clone(), MembershipTxOperations::ObjectId)),
        )
        .to_owned();
    Query::delete()
        .from_table(Membership::Table)
        .and_where(Expr::exists(forced))
        .to_owned()
}

fn commit_adds_stmt(tx_id: &str) -> KoineResult<sea_query::InsertStatement> {
    let m = Alias::new("m");
    let mto = Alias::new("mto");
    // Replay guard: an identical committed interval absorbs the add.
    let duplicate = Query::select()
        .expr(Expr::val(1))
        .from_as(Membership::Table, m.clone())
        .and_where(
            Expr::col((m.clone(), Membership::SourceId))
                .equals((mto.clone(), MembershipTxOperations::SourceId)),
        )
        .and_where(
            Expr::col((m.clone(), Membership::SubjectId))
                .equals((mto.clone(), MembershipTxOperations::SubjectId)),
        )
        .and_where(
            Expr::col((m.clone(), Membership::Property))
                .equals((mto.clone(), MembershipTxOperations::Property)),
        )
        .and_where(
            Expr::col((m.clone(), Membership::ObjectId))
                .equals((mto.clone(), MembershipTxOperations::ObjectId)),
        )
        .and_where(
            Expr::col((m.clone(), Membership::StartTime))
                .equals((mto.clone(), MembershipTxOperations::StartTime)),
        )
        .and_where(
            Expr::col((m.clone(), Membership::EndTime))
                .equals((mto.clone(), MembershipTxOperations::EndTime)),
        )
        .to_owned();
    let select = Query::select()
        .column((mto.clone(), MembershipTxOperations::SubjectId))
        .column((mto.clone(), MembershipTxOperations::Property))
        .column((mto.clone(), MembershipTxOperations::ObjectId))
        .column((mto.clone(), MembershipTxOperations::SourceId))
        .column((mto.clone(), MembershipTxOperations::StartTime))
        .column((mto.clone(), MembershipTxOperations::EndTime))
        .from_as(MembershipTxOperations::Table, mto.clone())
        .and_where(Expr::col((mto.clone(), MembershipTxOperations::TxId)).eq(tx_id))
        .and_where(
            Expr::col((mto.clone(), MembershipTxOperations::Operation))
                .eq(TxOperation::Add.as_str()),
        )
        .and_where(Expr::exists(duplicate).not())
        .to_owned();
    let mut insert = Query::insert()
        .into_table(Membership::Table)
        .columns([
            Membership::SubjectId,
            Membership::Property,
            Membership::ObjectId,
            Membership::SourceId,
            Membership::StartTime,
            Membership::EndTime,
        ])
        .to_owned();
    insert
        .select_from(select)
        .map_err(|err| KoineError::storage(err.to_string()))?;
    Ok(insert)
}

fn delete_transaction_stmt(tx_id: &str) -> DeleteStatement {
    Query::delete()
        .from_table(MembershipTxOperations::Table)
        .and_where(Expr::col(MembershipTxOperations::TxId).eq(tx_id))
        .to_owned()
}

/// Live view: committed still-asserted rows minus this transaction's staged
/// deletes, plus this transaction's staged adds. A missing transaction id
/// binds NULL, which matches no staging row.
fn membership_live_query(tx_id: Option<&str>, subject_id: &ResourceId) -> SelectStatement {
    let subject = subject_id.full_id();
    let tx = tx_id.map(str::to_string);
    let m = Alias::new("m");
    let mto = Alias::new("mto");
    let staged_delete = Query::select()
        .expr(Expr::val(1))
        .from_as(MembershipTxOperations::Table, mto.clone())
        .and_where(Expr::col((mto.clone(), MembershipTxOperations::SubjectId)).eq(subject.as_str()))
        .and_where(
            Expr::col((mto.clone(), MembershipTxOperations::SourceId))
                .equals((m.clone(), Membership::SourceId)),
        )
        .and_where(
            Expr::col((mto.clone(), MembershipTxOperations::ObjectId))
                .equals((m.clone(), Membership::ObjectId)),
        )
        .and_where(Expr::col((mto.clone(), MembershipTxOperations::TxId)).eq(tx.clone()))
        .and_where(
            Expr::col((mto.clone(), MembershipTxOperations::Operation))
                .eq(TxOperation::Delete.as_str()),
        )
        .to_owned();
    let mut query = Query::select()
        .column((m.clone(), Membership::Property))
        .column((m.clone(), Membership::ObjectId))
        .from_as(Membership::Table, m.clone())
        .and_where(Expr::col((m.clone(), Membership::SubjectId)).eq(subject.as_str()))
        .and_where(Expr::col((m.clone(), Membership::EndTime)).eq(Timestamp::NO_END.as_secs()))
        .and_where(Expr::exists(staged_delete).not())
        .to_owned();
    let staged_adds = Query::select()
        .column(MembershipTxOperations::Property)
        .column(MembershipTxOperations::ObjectId)
        .from(MembershipTxOperations::Table)
        .and_where(Expr::col(MembershipTxOperations::SubjectId).eq(subject.as_str()))
        .and_where(Expr::col(MembershipTxOperations::TxId).eq(tx.clone()))
        .and_where(Expr::col(MembershipTxOperations::EndTime).eq(Timestamp::NO_END.as_secs()))
        .and_where(Expr::col(MembershipTxOperations::Operation).eq(TxOperation::Add.as_str()))
        .to_owned();
    query.union(UnionType::Distinct, staged_adds);
    query
}

/// Memento view: rows whose interval covers the instant, minus staged
/// deletes that take effect at or before it, plus staged adds covering it.
fn membership_memento_query(
    tx_id: Option<&str>,
    subject_id: &ResourceId,
    instant: Timestamp,
) -> SelectStatement {
    let subject = subject_id.base_id().to_string();
    let tx = tx_id.map(str::to_string);
    let m = Alias::new("m");
    let mto = Alias::new("mto");
    let staged_delete = Query::select()
        .expr(Expr::val(1))
        .from_as(MembershipTxOperations::Table, mto.clone())
        .and_where(Expr::col((mto.clone(), MembershipTxOperations::SubjectId)).eq(subject.as_str()))
        .and_where(
            Expr::col((mto.clone(), MembershipTxOperations::SourceId))
                .equals((m.clone(), Membership::SourceId)),
        )
        .and_where(
            Expr::col((mto.clone(), MembershipTxOperations::Property))
                .equals((m.clone(), Membership::Property)),
        )
        .and_where(
            Expr::col((mto.clone(), MembershipTxOperations::ObjectId))
                .equals((m.clone(), Membership::ObjectId)),
        )
        .and_where(Expr::col((mto.clone(), MembershipTxOperations::EndTime)).lte(instant.as_secs()))
        .and_where(Expr::col((mto.clone(), MembershipTxOperations::TxId)).eq(tx.clone()))
        .and_where(
            Expr::col((mto.clone(), MembershipTxOperations::Operation))
                .eq(TxOperation::Delete.as_str()),
        )
        .to_owned();
    let mut query = Query::select()
        .column((m.clone(), Membership::Property))
        .column((m.clone(), Membership::ObjectId))
        .from_as(Membership::Table, m.clone())
        .and_where(Expr::col((m.clone(), Membership::SubjectId)).eq(subject.as_str()))
        .and_where(Expr::col((m.clone(), Membership::StartTime)).lte(instant.as_secs()))
        .and_where(Expr::col((m.clone(), Membership::EndTime)).gt(instant.as_secs()))
        .and_where(Expr::exists(staged_delete).not())
        .to_owned();
    let staged_adds = Query::select()
        .column(MembershipTxOperations::Property)
        .column(MembershipTxOperations::ObjectId)
        .from(MembershipTxOperations::Table)
        .and_where(Expr::col(MembershipTxOperations::SubjectId).eq(subject.as_str()))
        .and_where(Expr::col(MembershipTxOperations::TxId).eq(tx.clone()))
        .and_where(Expr::col(MembershipTxOperations::StartTime).lte(instant.as_secs()))
        .and_where(Expr::col(MembershipTxOperations::EndTime).gt(instant.as_secs()))
        .and_where(Expr::col(MembershipTxOperations::Operation).eq(TxOperation::Add.as_str()))
        .to_owned();
    query.union(UnionType::Distinct, staged_adds);
    query
}

fn build_connection_url(config: &IndexConfig, base_dir: &Path) -> KoineResult<String> {
    match &config.database {
        koine_core::DatabaseConfig::Sqlite { .. } => {
            let path = config.sqlite_path(base_dir)?;
            Ok(format!("sqlite://{}?mode=rwc", path.display()))
        }
        koine_core::DatabaseConfig::Postgres { url } => Ok(url.clone()),
        koine_core::DatabaseConfig::Mysql { url } => Ok(url.clone()),
    }
}

fn col_name(column: impl sea_query::Iden) -> String {
    column.to_string()
}

fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm::sea_query::Values) {
    match backend {
        DatabaseBackend::Sqlite => stmt.build(SqliteQueryBuilder),
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => stmt.build(MysqlQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

async fn exec<C, S>(conn: &C, stmt: &S) -> KoineResult<u64>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let result = conn
        .execute(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(result.rows_affected())
}

async fn query_all<C, S>(conn: &C, stmt: &S) -> KoineResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let rows = conn
        .query_all(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(rows)
}
