use super::mutation::{Dialect, MutationOp, PARTITION_TABLES};
use rusqlite::{params_from_iter, Connection, Result, Transaction};
use tracing::{debug, trace};

const SCHEMA_VERSION: i64 = 1;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.configure_pragmas()?;
        db.migrate_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.configure_pragmas()?;
        db.migrate_schema()?;
        Ok(db)
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode, 64MB cache)");
        Ok(())
    }

    /// Create the schema on a fresh database. Older layouts are dropped; the
    /// replica is rebuilt from the event feed.
    fn migrate_schema(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version > 0 && version < SCHEMA_VERSION {
            debug!(
                "Schema version {} < {}, dropping all tables and recreating",
                version, SCHEMA_VERSION
            );
            self.conn.execute_batch(
                "DROP TABLE IF EXISTS file_diff;
                 DROP TABLE IF EXISTS backup_file;
                 DROP TABLE IF EXISTS small_file;
                 DROP TABLE IF EXISTS file_state;
                 DROP TABLE IF EXISTS file;",
            )?;
        }

        self.conn.execute_batch(include_str!("schema.sql"))?;
        debug!("SQLite schema initialized (version {})", SCHEMA_VERSION);
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run the ops in order inside an open transaction. Returns rows touched.
    pub(crate) fn execute_in(&self, tx: &Transaction<'_>, ops: &[MutationOp]) -> Result<usize> {
        let mut touched = 0;
        for op in ops {
            for statement in op.render(Dialect::Sqlite) {
                trace!("{} {:?}", statement.sql, statement.params);
                let mut stmt = tx.prepare_cached(&statement.sql)?;
                touched += stmt.execute(params_from_iter(statement.params.iter()))?;
            }
        }
        Ok(touched)
    }

    pub fn truncate_all(&self) -> Result<()> {
        let mut sql = String::new();
        for table in PARTITION_TABLES {
            sql.push_str(&format!("DELETE FROM {};\n", table));
        }
        sql.push_str("DELETE FROM file_diff;\nDELETE FROM backup_file;");
        self.conn.execute_batch(&sql)?;
        debug!("All tables truncated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_on_disk_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replica.db");
        let path = path.to_str().unwrap();

        {
            let db = Database::open(path).unwrap();
            db.connection()
                .execute("INSERT INTO file (path) VALUES ('/kept')", [])
                .unwrap();
        }

        let db = Database::open(path).unwrap();
        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM file", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let version: i64 = db
            .connection()
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
