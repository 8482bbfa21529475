//! Flat-file table store.
//!
//! Each table lives in `<data_dir>/<table>.csv`. Writers take an exclusive
//! advisory lock on the sibling `<table>.csv.lock` file for the whole
//! load → modify → persist cycle, and persist by writing a temporary file and
//! renaming it over the table. Readers take no lock: a rename is atomic, so
//! they always see either the previous or the next committed version.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::csv;
use crate::error::StoreError;
use crate::tables::{
    next_id, ChecklistEntry, ChecklistItem, Identified, MenuItem, Post, Record, Reservation,
    Shift, TableView, User,
};

const TABLE_EXTENSION: &str = "csv";
const LOCK_SUFFIX: &str = ".lock";
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What a transaction body decided to do with the loaded rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<R> {
    /// Persist the (possibly modified) rows, then return `R`.
    Commit(R),
    /// Leave the table file untouched.
    Keep(R),
}

/// Outcome of a delete by id. Deleting a missing id is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Removed {
    Deleted,
    Missing,
}

#[derive(Debug, Clone)]
pub struct Store {
    config: StoreConfig,
}

/// Holds a table's advisory lock until dropped.
#[derive(Debug)]
struct TableLock {
    file: File,
    table: &'static str,
}

impl Drop for TableLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            warn!(table = self.table, error = %err, "failed to release table lock");
        }
        debug!(table = self.table, "released table lock");
    }
}

impl Store {
    /// Opens (and creates if needed) the data directory. Table files are not
    /// touched; see [`Store::bootstrap`].
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.data_dir)
            .map_err(|err| StoreError::io(&config.data_dir, err))?;
        Ok(Store { config })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        self.config.data_dir.as_path()
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.config
            .data_dir
            .join(format!("{table}.{TABLE_EXTENSION}"))
    }

    fn lock_path(&self, table: &str) -> PathBuf {
        self.config
            .data_dir
            .join(format!("{table}.{TABLE_EXTENSION}{LOCK_SUFFIX}"))
    }

    /// Writes the header of every table whose file does not exist yet.
    pub fn bootstrap(&self) -> Result<(), StoreError> {
        self.ensure_table::<User>()?;
        self.ensure_table::<ChecklistItem>()?;
        self.ensure_table::<ChecklistEntry>()?;
        self.ensure_table::<Shift>()?;
        self.ensure_table::<Reservation>()?;
        self.ensure_table::<MenuItem>()?;
        self.ensure_table::<Post>()?;
        Ok(())
    }

    fn ensure_table<T: Record>(&self) -> Result<(), StoreError> {
        let _lock = self.lock(T::TABLE)?;
        if self.table_path(T::TABLE).exists() {
            return Ok(());
        }
        self.persist::<T>(&[])?;
        debug!(table = T::TABLE, "created table");
        Ok(())
    }

    /// Current committed rows. A missing file is an empty table; a malformed
    /// one is logged and read as empty.
    pub fn read<T: Record>(&self) -> Result<Vec<T>, StoreError> {
        match self.load::<T>() {
            Ok(rows) => Ok(rows),
            Err(err @ StoreError::Malformed { .. }) => {
                warn!(table = T::TABLE, error = %err, "reading malformed table as empty");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Runs `body` against the current rows while holding the table lock. On
    /// [`Change::Commit`] the rows are persisted before the lock is released.
    /// A malformed table aborts the transaction instead of being overwritten.
    pub fn transact<T, R, F>(&self, body: F) -> Result<R, StoreError>
    where
        T: Record,
        F: FnOnce(&mut Vec<T>) -> Change<R>,
    {
        let _lock = self.lock(T::TABLE)?;
        let mut rows = self.load::<T>()?;
        match body(&mut rows) {
            Change::Commit(out) => {
                self.persist(rows.as_slice())?;
                debug!(table = T::TABLE, rows = rows.len(), "committed table");
                Ok(out)
            }
            Change::Keep(out) => Ok(out),
        }
    }

    /// Appends the row built from the next free id and returns that id.
    pub fn insert_next<T, F>(&self, build: F) -> Result<u64, StoreError>
    where
        T: Record + Identified,
        F: FnOnce(u64) -> T,
    {
        self.transact::<T, _, _>(|rows| {
            let id = next_id(rows.as_slice());
            rows.push(build(id));
            Change::Commit(id)
        })
    }

    /// Deletes the row with `id`, if any.
    pub fn remove_id<T>(&self, id: u64) -> Result<Removed, StoreError>
    where
        T: Record + Identified,
    {
        self.transact::<T, _, _>(|rows| {
            let before = rows.len();
            rows.retain(|row| row.id() != id);
            if rows.len() == before {
                Change::Keep(Removed::Missing)
            } else {
                Change::Commit(Removed::Deleted)
            }
        })
    }

    /// Untyped view of a table, looked up by name.
    pub fn read_table(&self, name: &str) -> Result<TableView, StoreError> {
        match name {
            User::TABLE => self.view::<User>(),
            ChecklistItem::TABLE => self.view::<ChecklistItem>(),
            ChecklistEntry::TABLE => self.view::<ChecklistEntry>(),
            Shift::TABLE => self.view::<Shift>(),
            Reservation::TABLE => self.view::<Reservation>(),
            MenuItem::TABLE => self.view::<MenuItem>(),
            Post::TABLE => self.view::<Post>(),
            other => Err(StoreError::UnknownTable(other.to_string())),
        }
    }

    fn view<T: Record>(&self) -> Result<TableView, StoreError> {
        Ok(TableView::from_records(self.read::<T>()?.as_slice()))
    }

    fn lock(&self, table: &'static str) -> Result<TableLock, StoreError> {
        let path = self.lock_path(table);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|err| StoreError::io(&path, err))?;

        let Some(timeout) = self.config.lock_timeout else {
            file.lock().map_err(|err| StoreError::io(&path, err))?;
            debug!(table, "acquired table lock");
            return Ok(TableLock { file, table });
        };

        let started = Instant::now();
        loop {
            match file.try_lock() {
                Ok(()) => {
                    let waited_ms = started.elapsed().as_millis() as u64;
                    debug!(table, waited_ms, "acquired table lock");
                    return Ok(TableLock { file, table });
                }
                Err(TryLockError::WouldBlock) => {
                    if started.elapsed() >= timeout {
                        let timeout_ms = timeout.as_millis() as u64;
                        warn!(table, timeout_ms, "table lock wait timed out");
                        return Err(StoreError::LockTimeout {
                            table: table.to_string(),
                        });
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(TryLockError::Error(err)) => return Err(StoreError::io(&path, err)),
            }
        }
    }

    fn load<T: Record>(&self) -> Result<Vec<T>, StoreError> {
        let path = self.table_path(T::TABLE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                return Err(malformed::<T>(1, "file is not valid UTF-8"));
            }
            Err(err) => return Err(StoreError::io(&path, err)),
        };
        decode::<T>(raw.as_str())
    }

    fn persist<T: Record>(&self, rows: &[T]) -> Result<(), StoreError> {
        let path = self.table_path(T::TABLE);
        let content = csv::encode(T::COLUMNS, rows.iter().map(T::to_fields));
        write_atomic(&path, content.as_bytes())
    }
}

fn malformed<T: Record>(line: usize, reason: impl Into<String>) -> StoreError {
    StoreError::Malformed {
        table: T::TABLE.to_string(),
        line,
        reason: reason.into(),
    }
}

fn decode<T: Record>(raw: &str) -> Result<Vec<T>, StoreError> {
    let mut lines = csv::parse(raw)
        .map_err(|err| malformed::<T>(err.line, err.reason))?
        .into_iter();
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    if header.fields.iter().map(String::as_str).ne(T::COLUMNS.iter().copied()) {
        return Err(malformed::<T>(
            header.line,
            format!(
                "expected header `{}`, found `{}`",
                T::COLUMNS.join(","),
                header.fields.join(",")
            ),
        ));
    }
    lines
        .map(|parsed| {
            if parsed.fields.len() != T::COLUMNS.len() {
                return Err(malformed::<T>(
                    parsed.line,
                    format!(
                        "expected {} fields, found {}",
                        T::COLUMNS.len(),
                        parsed.fields.len()
                    ),
                ));
            }
            T::from_fields(parsed.fields).map_err(|reason| malformed::<T>(parsed.line, reason))
        })
        .collect()
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}

/// Replaces `path` with `bytes` so that readers see the old or the new
/// content, never a mix. The temporary file is removed on failure.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = temp_path(path);
    if let Err(err) = write_then_rename(tmp.as_path(), path, bytes) {
        if let Err(cleanup) = fs::remove_file(&tmp) {
            if cleanup.kind() != io::ErrorKind::NotFound {
                warn!(path = %tmp.display(), error = %cleanup, "failed to remove temporary file");
            }
        }
        return Err(StoreError::io(path, err));
    }
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    {
        let mut file = File::create(tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    #[cfg(test)]
    fault::before_rename()?;
    fs::rename(tmp, path)
}


#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;

    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;
    use crate::tables::TABLE_ORDER;

    struct Fixture {
        _dir: TempDir,
        store: Store,
    }

    #[fixture]
    fn fx() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(StoreConfig::new(dir.path())).unwrap();
        Fixture { _dir: dir, store }
    }

    fn menu(name: &str) -> MenuItem {
        MenuItem {
            item_name: name.to_string(),
        }
    }

    fn post(id: u64) -> Post {
        Post {
            id,
            category: "notice".to_string(),
            title: format!("post {id}"),
            content: "body".to_string(),
            author: "Lee".to_string(),
            date: "2024-05-01".to_string(),
        }
    }

    #[rstest]
    fn missing_table_reads_as_empty(fx: Fixture) {
        assert!(fx.store.read::<Shift>().unwrap().is_empty());
        assert!(!fx.store.table_path("schedule").exists());
    }

    #[rstest]
    fn bootstrap_writes_headers_once(fx: Fixture) {
        fx.store.bootstrap().unwrap();
        let raw = fs::read_to_string(fx.store.table_path("schedule")).unwrap();
        assert_eq!(raw, "id,date,user,start_time,end_time,role\n");

        fx.store
            .transact::<MenuItem, _, _>(|rows| {
                rows.push(menu("Baguette"));
                Change::Commit(())
            })
            .unwrap();
        fx.store.bootstrap().unwrap();
        assert_eq!(fx.store.read::<MenuItem>().unwrap(), vec![menu("Baguette")]);
    }

    #[rstest]
    fn keep_does_not_touch_the_file(fx: Fixture) {
        let out = fx
            .store
            .transact::<MenuItem, _, _>(|rows| {
                rows.push(menu("ignored"));
                Change::Keep(7)
            })
            .unwrap();
        assert_eq!(out, 7);
        assert!(!fx.store.table_path("reservation_menu").exists());
    }

    #[rstest]
    fn malformed_table_reads_empty_but_blocks_writes(fx: Fixture) {
        let path = fx.store.table_path("schedule");
        fs::write(&path, "id,date,user,start_time,end_time,role\n1,2024-05-01,Kim\n").unwrap();

        assert!(fx.store.read::<Shift>().unwrap().is_empty());
        let err = fx
            .store
            .transact::<Shift, _, _>(|rows| {
                rows.clear();
                Change::Commit(())
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Malformed { line: 2, .. }));
        assert!(fs::read_to_string(&path).unwrap().contains("1,2024-05-01,Kim"));
    }

    #[rstest]
    fn empty_single_column_row_is_kept(fx: Fixture) {
        fx.store
            .transact::<MenuItem, _, _>(|rows| {
                rows.extend([menu(""), menu("Scone")]);
                Change::Commit(())
            })
            .unwrap();
        assert_eq!(fx.store.read::<MenuItem>().unwrap(), vec![menu(""), menu("Scone")]);
    }

    #[rstest]
    fn wrong_header_is_malformed(fx: Fixture) {
        fs::write(fx.store.table_path("reservation_menu"), "name\nScone\n").unwrap();
        let err = fx.store.load::<MenuItem>().unwrap_err();
        assert!(matches!(err, StoreError::Malformed { line: 1, .. }));
    }

    #[rstest]
    fn failed_persist_leaves_previous_contents(fx: Fixture) {
        fx.store.insert_next::<Post, _>(post).unwrap();
        let path = fx.store.table_path("posts");
        let before = fs::read(&path).unwrap();

        fault::fail_next_rename();
        let err = fx.store.insert_next::<Post, _>(post).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(!temp_path(&path).exists());

        // The lock was released on the error path.
        assert_eq!(fx.store.insert_next::<Post, _>(post).unwrap(), 2);
    }

    #[rstest]
    fn remove_id_is_idempotent(fx: Fixture) {
        for _ in 0..3 {
            fx.store.insert_next::<Post, _>(post).unwrap();
        }
        assert_eq!(fx.store.remove_id::<Post>(2).unwrap(), Removed::Deleted);
        let before = fs::read(fx.store.table_path("posts")).unwrap();
        assert_eq!(fx.store.remove_id::<Post>(2).unwrap(), Removed::Missing);
        assert_eq!(fs::read(fx.store.table_path("posts")).unwrap(), before);
        let ids: Vec<u64> = fx.store.read::<Post>().unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn lock_wait_times_out_and_leaves_nothing_held() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path()).with_lock_timeout(Duration::from_millis(50));
        let store = Store::open(config).unwrap();
        let holder = store.clone();

        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            holder
                .transact::<MenuItem, _, _>(|_| {
                    locked_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Change::Keep(())
                })
                .unwrap();
        });
        locked_rx.recv().unwrap();

        let err = store
            .transact::<MenuItem, _, _>(|_| Change::Keep(()))
            .unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));

        // Other tables are separate lock domains.
        store.insert_next::<Post, _>(post).unwrap();

        release_tx.send(()).unwrap();
        handle.join().unwrap();
        store
            .transact::<MenuItem, _, _>(|rows| {
                rows.push(menu("Scone"));
                Change::Commit(())
            })
            .unwrap();
        assert_eq!(store.read::<MenuItem>().unwrap(), vec![menu("Scone")]);
    }

    #[rstest]
    fn read_table_by_name(fx: Fixture) {
        fx.store.insert_next::<Post, _>(post).unwrap();
        let view = fx.store.read_table("posts").unwrap();
        assert_eq!(view.columns, Post::COLUMNS);
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0]["title"], "post 1");
        for name in TABLE_ORDER {
            assert_eq!(fx.store.read_table(name).unwrap().id, name);
        }
        assert!(matches!(
            fx.store.read_table("recipes"),
            Err(StoreError::UnknownTable(_))
        ));
    }
}
