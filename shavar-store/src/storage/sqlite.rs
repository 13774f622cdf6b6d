//! SQLite storage backend for shavar-store.

use super::{ApplySummary, ChunkStore, StoreStats};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use shavar_types::{
    AddEntry, ChunkNum, ChunkRange, Directive, FullHash, FullHashEntry, HostKey, ListName, Prefix,
    RetrySchedule, SubEntry,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Host key and prefix of an empty add chunk's sentinel row.
const EMPTY_ADD_SENTINEL: &[u8] = &[];

/// SQLite-based chunk storage.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteChunkStore {
    pool: SqlitePool,
}

impl SqliteChunkStore {
    /// Open (or create) a chunk store at `path`.
    pub async fn new(path: &Path) -> Result<Self, StoreError> {
        if path.as_os_str().is_empty() || path.is_dir() {
            return Err(StoreError::InvalidPath {
                path: path.to_path_buf(),
            });
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(StoreError::Database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        tracing::debug!("Opened chunk store at {}", path.display());
        Ok(store)
    }

    /// Create an in-memory chunk store (for testing).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StoreError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // One connection that never recycles: each in-memory connection is
        // its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StoreError::Database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        // Create tables
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS add_entries (
                list TEXT NOT NULL,
                add_chunk_num INTEGER NOT NULL,
                host_key BLOB NOT NULL,
                prefix BLOB NOT NULL,
                PRIMARY KEY (list, add_chunk_num, host_key, prefix)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sub_entries (
                list TEXT NOT NULL,
                add_chunk_num INTEGER NOT NULL,
                sub_chunk_num INTEGER NOT NULL,
                host_key BLOB NOT NULL,
                prefix BLOB NOT NULL,
                PRIMARY KEY (list, add_chunk_num, host_key, prefix)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS full_hashes (
                list TEXT NOT NULL,
                add_chunk_num INTEGER NOT NULL,
                full_hash BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (list, add_chunk_num, full_hash)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS retry_schedule (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                next_attempt INTEGER NOT NULL DEFAULT 0,
                error_count INTEGER NOT NULL DEFAULT 0,
                last_attempt INTEGER NOT NULL DEFAULT 0,
                last_success INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query("INSERT OR IGNORE INTO retry_schedule (id) VALUES (1)")
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        // Create indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_add_entries_host_key ON add_entries(host_key)")
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sub_entries_sub_chunk ON sub_entries(list, sub_chunk_num)",
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_full_hashes_hash ON full_hashes(full_hash)")
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_full_hashes_created_at ON full_hashes(created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(())
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn insert_add(&self, entry: &AddEntry) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::Database)?;
        insert_add(&mut conn, entry).await
    }

    async fn insert_sub(&self, entry: &SubEntry) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::Database)?;
        insert_sub(&mut conn, entry).await
    }

    async fn delete_add_range(
        &self,
        list: &ListName,
        range: ChunkRange,
    ) -> Result<u64, StoreError> {
        // Three tables; keep them consistent
        let mut tx = self.pool.begin().await.map_err(StoreError::Database)?;
        let deleted = delete_add_range(&mut tx, list, range).await?;
        tx.commit().await.map_err(StoreError::Database)?;
        Ok(deleted)
    }

    async fn delete_sub_range(
        &self,
        list: &ListName,
        range: ChunkRange,
    ) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::Database)?;
        delete_sub_range(&mut conn, list, range).await
    }

    async fn upsert_full_hash(&self, entry: &FullHashEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO full_hashes (list, add_chunk_num, full_hash, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(list, add_chunk_num, full_hash) DO UPDATE SET created_at = excluded.created_at
            "#,
        )
        .bind(entry.list.as_str())
        .bind(entry.add_chunk as i64)
        .bind(entry.hash.as_bytes().as_slice())
        .bind(entry.created_at as i64)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(())
    }

    async fn purge_expired_full_hashes(&self, now: u64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM full_hashes WHERE created_at <= ?1")
            .bind(FullHashEntry::cutoff(now) as i64)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        Ok(result.rows_affected())
    }

    async fn find_full_hashes(
        &self,
        hash: &FullHash,
        cutoff: u64,
    ) -> Result<Vec<FullHashEntry>, StoreError> {
        let rows = sqlx::query_as::<_, FullHashRow>(
            r#"
            SELECT list, add_chunk_num, full_hash, created_at
            FROM full_hashes
            WHERE full_hash = ?1 AND created_at > ?2
            ORDER BY list, add_chunk_num
            "#,
        )
        .bind(hash.as_bytes().as_slice())
        .bind(cutoff as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }

    async fn distinct_add_chunk_numbers(
        &self,
        list: &ListName,
    ) -> Result<Vec<ChunkNum>, StoreError> {
        let nums: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT add_chunk_num FROM add_entries WHERE list = ?1 ORDER BY add_chunk_num",
        )
        .bind(list.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        nums.into_iter()
            .map(|n| column::<ChunkNum>(n, "add_chunk_num"))
            .collect()
    }

    async fn distinct_sub_chunk_numbers(
        &self,
        list: &ListName,
    ) -> Result<Vec<ChunkNum>, StoreError> {
        let nums: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT sub_chunk_num FROM sub_entries WHERE list = ?1 ORDER BY sub_chunk_num",
        )
        .bind(list.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        nums.into_iter()
            .map(|n| column::<ChunkNum>(n, "sub_chunk_num"))
            .collect()
    }

    async fn lookup_candidate_prefixes(
        &self,
        host_keys: &[HostKey],
    ) -> Result<Vec<AddEntry>, StoreError> {
        let mut keys: Vec<[u8; 4]> = host_keys.iter().map(|k| *k.as_bytes()).collect();
        keys.sort_unstable();
        keys.dedup();

        let mut conn = self.pool.acquire().await.map_err(StoreError::Database)?;
        let mut out = Vec::new();

        for key in keys {
            let rows = sqlx::query_as::<_, AddRow>(
                r#"
                SELECT a.list, a.add_chunk_num, a.host_key, a.prefix
                FROM add_entries a
                WHERE a.host_key = ?1
                  AND NOT EXISTS (
                      SELECT 1 FROM sub_entries s
                      WHERE s.list = a.list
                        AND s.add_chunk_num = a.add_chunk_num
                        AND s.host_key = a.host_key
                        AND s.prefix = a.prefix
                  )
                ORDER BY a.list, a.add_chunk_num, a.prefix
                "#,
            )
            .bind(key.as_slice())
            .fetch_all(&mut *conn)
            .await
            .map_err(StoreError::Database)?;

            for row in rows {
                out.push(row.try_into()?);
            }
        }

        Ok(out)
    }

    async fn apply_batch(&self, directives: &[Directive]) -> Result<ApplySummary, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Database)?;

        let mut summary = ApplySummary::default();
        for directive in directives {
            apply_directive(&mut tx, directive, &mut summary).await?;
        }

        tx.commit().await.map_err(StoreError::Database)?;
        tracing::debug!(
            "Applied {} directives ({} inserted, {} duplicate, {} deleted)",
            directives.len(),
            summary.inserted,
            summary.duplicates,
            summary.deleted
        );
        Ok(summary)
    }

    async fn commit_cycle(
        &self,
        directives: &[Directive],
        expected: RetrySchedule,
        next: RetrySchedule,
    ) -> Result<ApplySummary, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Database)?;

        // Claim the schedule first so a losing writer does no work
        swap_schedule(&mut tx, expected, next).await?;

        let mut summary = ApplySummary::default();
        for directive in directives {
            apply_directive(&mut tx, directive, &mut summary).await?;
        }

        tx.commit().await.map_err(StoreError::Database)?;
        Ok(summary)
    }

    async fn read_retry_schedule(&self) -> Result<RetrySchedule, StoreError> {
        let row = sqlx::query_as::<_, ScheduleRow>(
            r#"
            SELECT next_attempt, error_count, last_attempt, last_success
            FROM retry_schedule
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        match row {
            Some(r) => r.try_into(),
            None => Ok(RetrySchedule::default()),
        }
    }

    async fn write_retry_schedule(
        &self,
        expected: RetrySchedule,
        next: RetrySchedule,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::Database)?;
        swap_schedule(&mut conn, expected, next).await
    }

    async fn reset_all(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Database)?;

        let deleted = clear_chunk_tables(&mut tx).await?;
        sqlx::query(
            r#"
            UPDATE retry_schedule
            SET next_attempt = 0, error_count = 0, last_attempt = 0, last_success = 0
            WHERE id = 1
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(StoreError::Database)?;

        tx.commit().await.map_err(StoreError::Database)?;
        tracing::info!("Reset chunk store ({} rows removed)", deleted);
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let add_entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM add_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Database)?;
        let sub_entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sub_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Database)?;
        let full_hashes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM full_hashes")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        Ok(StoreStats {
            add_entries: add_entries as u64,
            sub_entries: sub_entries as u64,
            full_hashes: full_hashes as u64,
        })
    }
}

/// Apply one directive on an open connection or transaction.
async fn apply_directive(
    conn: &mut SqliteConnection,
    directive: &Directive,
    summary: &mut ApplySummary,
) -> StoreResult<()> {
    tracing::trace!("Applying {}", directive.action());

    let inserted = match directive {
        // Not store operations; the engine reads these from the batch
        Directive::SetTimeout { .. } | Directive::Rekey => return Ok(()),
        Directive::ResetAll => {
            summary.deleted += clear_chunk_tables(conn).await?;
            summary.resets += 1;
            return Ok(());
        }
        Directive::AddDelete { list, range } => {
            summary.deleted += delete_add_range(conn, list, *range).await?;
            return Ok(());
        }
        Directive::SubDelete { list, range } => {
            summary.deleted += delete_sub_range(conn, list, *range).await?;
            return Ok(());
        }
        Directive::AddInsert(entry) => insert_add(conn, entry).await?,
        Directive::SubInsert(entry) => insert_sub(conn, entry).await?,
        Directive::AddEmpty { list, add_chunk } => {
            insert_add_row(conn, list, *add_chunk, EMPTY_ADD_SENTINEL, EMPTY_ADD_SENTINEL).await?
        }
        Directive::SubEmpty { list, sub_chunk } => {
            // Chunk 0 is never published, so this row matches no add entry
            let key = sub_chunk.to_be_bytes();
            insert_sub_row(conn, list, 0, *sub_chunk, &key, &key).await?
        }
    };

    if inserted {
        summary.inserted += 1;
    } else {
        summary.duplicates += 1;
    }
    Ok(())
}

async fn insert_add(conn: &mut SqliteConnection, entry: &AddEntry) -> StoreResult<bool> {
    insert_add_row(
        conn,
        &entry.list,
        entry.add_chunk,
        entry.host_key.as_bytes(),
        entry.prefix.as_bytes(),
    )
    .await
}

async fn insert_add_row(
    conn: &mut SqliteConnection,
    list: &ListName,
    add_chunk: ChunkNum,
    host_key: &[u8],
    prefix: &[u8],
) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO add_entries (list, add_chunk_num, host_key, prefix)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(list.as_str())
    .bind(add_chunk as i64)
    .bind(host_key)
    .bind(prefix)
    .execute(&mut *conn)
    .await
    .map_err(StoreError::Database)?;

    Ok(result.rows_affected() == 1)
}

async fn insert_sub(conn: &mut SqliteConnection, entry: &SubEntry) -> StoreResult<bool> {
    insert_sub_row(
        conn,
        &entry.list,
        entry.add_chunk,
        entry.sub_chunk,
        entry.host_key.as_bytes(),
        entry.prefix.as_bytes(),
    )
    .await
}

async fn insert_sub_row(
    conn: &mut SqliteConnection,
    list: &ListName,
    add_chunk: ChunkNum,
    sub_chunk: ChunkNum,
    host_key: &[u8],
    prefix: &[u8],
) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO sub_entries (list, add_chunk_num, sub_chunk_num, host_key, prefix)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(list.as_str())
    .bind(add_chunk as i64)
    .bind(sub_chunk as i64)
    .bind(host_key)
    .bind(prefix)
    .execute(&mut *conn)
    .await
    .map_err(StoreError::Database)?;

    Ok(result.rows_affected() == 1)
}

async fn delete_add_range(
    conn: &mut SqliteConnection,
    list: &ListName,
    range: ChunkRange,
) -> StoreResult<u64> {
    let mut deleted = 0;
    // Empty sub chunks are stored under add chunk 0 and must survive `ad:0`
    for (table, extra) in [
        ("add_entries", ""),
        ("sub_entries", " AND add_chunk_num > 0"),
        ("full_hashes", ""),
    ] {
        let sql = format!(
            "DELETE FROM {} WHERE list = ?1 AND add_chunk_num BETWEEN ?2 AND ?3{}",
            table, extra
        );
        let result = sqlx::query(&sql)
            .bind(list.as_str())
            .bind(range.lo() as i64)
            .bind(range.hi() as i64)
            .execute(&mut *conn)
            .await
            .map_err(StoreError::Database)?;
        deleted += result.rows_affected();
    }
    Ok(deleted)
}

async fn delete_sub_range(
    conn: &mut SqliteConnection,
    list: &ListName,
    range: ChunkRange,
) -> StoreResult<u64> {
    let result =
        sqlx::query("DELETE FROM sub_entries WHERE list = ?1 AND sub_chunk_num BETWEEN ?2 AND ?3")
            .bind(list.as_str())
            .bind(range.lo() as i64)
            .bind(range.hi() as i64)
            .execute(&mut *conn)
            .await
            .map_err(StoreError::Database)?;

    Ok(result.rows_affected())
}

async fn clear_chunk_tables(conn: &mut SqliteConnection) -> StoreResult<u64> {
    let mut deleted = 0;
    for table in ["add_entries", "sub_entries", "full_hashes"] {
        let result = sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *conn)
            .await
            .map_err(StoreError::Database)?;
        deleted += result.rows_affected();
    }
    Ok(deleted)
}

/// Conditional update of the schedule row; zero rows matched means another
/// writer got there first.
async fn swap_schedule(
    conn: &mut SqliteConnection,
    expected: RetrySchedule,
    next: RetrySchedule,
) -> StoreResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE retry_schedule
        SET next_attempt = ?1, error_count = ?2, last_attempt = ?3, last_success = ?4
        WHERE id = 1
          AND next_attempt = ?5
          AND error_count = ?6
          AND last_attempt = ?7
          AND last_success = ?8
        "#,
    )
    .bind(next.next_attempt as i64)
    .bind(next.error_count as i64)
    .bind(next.last_attempt as i64)
    .bind(next.last_success as i64)
    .bind(expected.next_attempt as i64)
    .bind(expected.error_count as i64)
    .bind(expected.last_attempt as i64)
    .bind(expected.last_success as i64)
    .execute(&mut *conn)
    .await
    .map_err(StoreError::Database)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::ScheduleConflict);
    }
    Ok(())
}

fn column<T: TryFrom<i64>>(value: i64, name: &str) -> StoreResult<T> {
    T::try_from(value)
        .map_err(|_| StoreError::CorruptRow(format!("{} out of range: {}", name, value)))
}

/// Internal row type for SQLite queries.
#[derive(sqlx::FromRow)]
struct AddRow {
    list: String,
    add_chunk_num: i64,
    host_key: Vec<u8>,
    prefix: Vec<u8>,
}

impl TryFrom<AddRow> for AddEntry {
    type Error = StoreError;

    fn try_from(row: AddRow) -> Result<Self, Self::Error> {
        Ok(AddEntry {
            list: ListName::new(row.list),
            add_chunk: column(row.add_chunk_num, "add_chunk_num")?,
            host_key: HostKey::from_bytes(&row.host_key).ok_or_else(|| {
                StoreError::CorruptRow(format!("host_key {}", hex::encode(&row.host_key)))
            })?,
            prefix: Prefix::from_bytes(&row.prefix).ok_or_else(|| {
                StoreError::CorruptRow(format!("prefix {}", hex::encode(&row.prefix)))
            })?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FullHashRow {
    list: String,
    add_chunk_num: i64,
    full_hash: Vec<u8>,
    created_at: i64,
}

impl TryFrom<FullHashRow> for FullHashEntry {
    type Error = StoreError;

    fn try_from(row: FullHashRow) -> Result<Self, Self::Error> {
        Ok(FullHashEntry {
            list: ListName::new(row.list),
            add_chunk: column(row.add_chunk_num, "add_chunk_num")?,
            hash: FullHash::from_bytes(&row.full_hash).ok_or_else(|| {
                StoreError::CorruptRow(format!("full_hash {}", hex::encode(&row.full_hash)))
            })?,
            created_at: column(row.created_at, "created_at")?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    next_attempt: i64,
    error_count: i64,
    last_attempt: i64,
    last_success: i64,
}

impl TryFrom<ScheduleRow> for RetrySchedule {
    type Error = StoreError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        Ok(RetrySchedule {
            next_attempt: column(row.next_attempt, "next_attempt")?,
            error_count: column(row.error_count, "error_count")?,
            last_attempt: column(row.last_attempt, "last_attempt")?,
            last_success: column(row.last_success, "last_success")?,
        })
    }
}
