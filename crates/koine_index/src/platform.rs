use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement};

use koine_core::{KoineError, KoineResult};

use crate::db::TxOperation;

// The end-date commit statement is the one piece of SQL whose join syntax
// is incompatible across back-ends, so each platform carries its native
// form. SQLite cannot alias the update target, hence the correlated
// subquery pair; Postgres and MySQL update through a join.

const COMMIT_ENDS_SQLITE: &str = concat!(
    "UPDATE membership",
    " SET end_time = (",
    " SELECT mto.end_time",
    " FROM membership_tx_operations mto",
    " WHERE mto.tx_id = ?",
    " AND mto.operation = ?",
    " AND membership.source_id = mto.source_id",
    " AND membership.subject_id = mto.subject_id",
    " AND membership.property = mto.property",
    " AND membership.object_id = mto.object_id",
    " )",
    " WHERE EXISTS (",
    " SELECT 1",
    " FROM membership_tx_operations mto",
    " WHERE mto.tx_id = ?",
    " AND mto.operation = ?",
    " AND membership.source_id = mto.source_id",
    " AND membership.subject_id = mto.subject_id",
    " AND membership.property = mto.property",
    " AND membership.object_id = mto.object_id",
    " )",
);

const COMMIT_ENDS_POSTGRES: &str = concat!(
    "UPDATE membership",
    " SET end_time = mto.end_time",
    " FROM membership_tx_operations mto",
    " WHERE mto.tx_id = $1",
    " AND mto.operation = $2",
    " AND membership.source_id = mto.source_id",
    " AND membership.subject_id = mto.subject_id",
    " AND membership.property = mto.property",
    " AND membership.object_id = mto.object_id",
);

const COMMIT_ENDS_MYSQL: &str = concat!(
    "UPDATE membership m",
    " INNER JOIN membership_tx_operations mto ON",
    " m.source_id = mto.source_id",
    " AND m.subject_id = mto.subject_id",
    " AND m.property = mto.property",
    " AND m.object_id = mto.object_id",
    " SET m.end_time = mto.end_time",
    " WHERE mto.tx_id = ?",
    " AND mto.operation = ?",
);

/// Relational platform behind the connection pool, detected once at
/// startup and immutable afterwards.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DbPlatform {
    Sqlite,
    Postgres,
    MySql,
    MariaDb,
}

impl DbPlatform {
    /// Detects the platform from the live connection. MySQL and MariaDB
    /// share a wire protocol and are told apart by the server version
    /// string. Any other backend is a fatal configuration error.
    pub async fn detect(conn: &DatabaseConnection) -> KoineResult<Self> {
        match conn.get_database_backend() {
            DatabaseBackend::Sqlite => Ok(DbPlatform::Sqlite),
            DatabaseBackend::Postgres => Ok(DbPlatform::Postgres),
            DatabaseBackend::MySql => {
                let row = conn
                    .query_one(Statement::from_string(
                        DatabaseBackend::MySql,
                        "SELECT VERSION()",
                    ))
                    .await?;
                let version: String = row
                    .map(|row| row.try_get_by_index(0))
                    .transpose()?
                    .unwrap_or_default();
                if version.to_ascii_lowercase().contains("mariadb") {
                    Ok(DbPlatform::MariaDb)
                } else {
                    Ok(DbPlatform::MySql)
                }
            }
            other => Err(KoineError::configuration(format!(
                "unsupported database platform: {other:?}"
            ))),
        }
    }

    pub fn backend(self) -> DatabaseBackend {
        match self {
            DbPlatform::Sqlite => DatabaseBackend::Sqlite,
            DbPlatform::Postgres => DatabaseBackend::Postgres,
            DbPlatform::MySql | DbPlatform::MariaDb => DatabaseBackend::MySql,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DbPlatform::Sqlite => "sqlite",
            DbPlatform::Postgres => "postgres",
            DbPlatform::MySql => "mysql",
            DbPlatform::MariaDb => "mariadb",
        }
    }

    pub fn commit_ends_sql(self) -> &'static str {
        match self {
            DbPlatform::Sqlite => COMMIT_ENDS_SQLITE,
            DbPlatform::Postgres => COMMIT_ENDS_POSTGRES,
            DbPlatform::MySql | DbPlatform::MariaDb => COMMIT_ENDS_MYSQL,
        }
    }

    /// Builds the end-date commit statement with its bind values. The
    /// SQLite form repeats the predicate in the assignment subquery and the
    /// guard, so it binds the pair twice.
    pub fn commit_ends_statement(self, tx_id: &str) -> Statement {
        let delete_op = TxOperation::Delete.as_str();
        let values: Vec<sea_orm::Value> = match self {
            DbPlatform::Sqlite => vec![
                tx_id.into(),
                delete_op.into(),
                tx_id.into(),
                delete_op.into(),
            ],
            DbPlatform::Postgres | DbPlatform::MySql | DbPlatform::MariaDb => {
                vec![tx_id.into(), delete_op.into()]
            }
        };
        Statement::from_sql_and_values(self.backend(), self.commit_ends_sql(), values)
    }
}
