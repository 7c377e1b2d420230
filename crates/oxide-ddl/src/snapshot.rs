//! Snapshots and the migration journal.
//!
//! A migrations directory looks like this:
//!
//! ```text
//! migrations/
//!   0000_init.sql
//!   0001_add_email.sql
//!   meta/
//!     _journal.json
//!     0000_snapshot.json
//!     0001_snapshot.json
//! ```
//!
//! Each snapshot stores the full entity list of the schema after its
//! migration, so the next `generate` diffs against the latest one.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DdlError, Result};
use crate::sqlite::ddl::{SqliteDdl, SqliteEntity};
use crate::sqlite::interim::ddl_from_entities;

/// Snapshot format version.
pub const SNAPSHOT_VERSION: &str = "6";

/// Journal format version.
pub const JOURNAL_VERSION: &str = "7";

/// The only dialect handled here.
pub const DIALECT: &str = "sqlite";

/// Id of the empty schema every history starts from.
pub const ORIGIN_ID: &str = "00000000-0000-0000-0000-000000000000";

fn check_dialect(found: &str) -> Result<()> {
    if found == DIALECT {
        Ok(())
    } else {
        Err(DdlError::DialectMismatch {
            expected: DIALECT.to_string(),
            found: found.to_string(),
        })
    }
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

// ============================================================================
// Snapshot
// ============================================================================

/// Serialized schema state after a migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Format version.
    pub version: String,
    /// Always `sqlite`.
    pub dialect: String,
    /// Unique id.
    pub id: String,
    /// Id of the snapshot this one follows.
    pub prev_id: String,
    /// Every entity of the schema.
    pub ddl: Vec<SqliteEntity>,
    /// Renames resolved while generating the migration, `from->to`. Kept as
    /// a record only; later diffs resolve their own renames.
    #[serde(default)]
    pub renames: Vec<String>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            dialect: DIALECT.to_string(),
            id: ORIGIN_ID.to_string(),
            prev_id: ORIGIN_ID.to_string(),
            ddl: Vec::new(),
            renames: Vec::new(),
        }
    }
}

impl Snapshot {
    /// The empty schema.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Captures `ddl` as the successor of `prev_id`.
    #[must_use]
    pub fn from_ddl(ddl: &SqliteDdl, prev_id: impl Into<String>, renames: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prev_id: prev_id.into(),
            ddl: ddl.to_entities(),
            renames,
            ..Self::default()
        }
    }

    /// Rebuilds the entity store.
    pub fn to_ddl(&self) -> Result<SqliteDdl> {
        let (ddl, errors) = ddl_from_entities(self.ddl.clone());
        if errors.is_empty() {
            Ok(ddl)
        } else {
            Err(DdlError::InvalidSchema(errors))
        }
    }

    /// Reads a snapshot file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: Self = serde_json::from_str(&content)?;
        check_dialect(&snapshot.dialect)?;
        debug!(path = %path.display(), entities = snapshot.ddl.len(), "Loaded snapshot");
        Ok(snapshot)
    }

    /// Writes the snapshot, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        check_dialect(&self.dialect)?;
        write_json(path, self)
    }
}

// ============================================================================
// Journal
// ============================================================================

/// One generated migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Position in the journal, starting at 0.
    pub idx: u32,
    /// Snapshot format version of the migration.
    pub version: String,
    /// Creation time, UTC milliseconds.
    pub when: i64,
    /// File stem of the migration, e.g. `0001_add_email`.
    pub tag: String,
    /// Whether the SQL file uses statement breakpoints.
    pub breakpoints: bool,
}

/// Ordered list of generated migrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    /// Format version.
    pub version: String,
    /// Always `sqlite`.
    pub dialect: String,
    /// Entries by `idx`.
    pub entries: Vec<JournalEntry>,
}

impl Default for Journal {
    fn default() -> Self {
        Self {
            version: JOURNAL_VERSION.to_string(),
            dialect: DIALECT.to_string(),
            entries: Vec::new(),
        }
    }
}

impl Journal {
    /// Reads the journal, or starts an empty one if the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let journal: Self = serde_json::from_str(&content)?;
        check_dialect(&journal.dialect)?;
        Ok(journal)
    }

    /// Index the next entry will get.
    #[must_use]
    pub fn next_idx(&self) -> u32 {
        self.entries.last().map_or(0, |entry| entry.idx + 1)
    }

    /// Last entry.
    #[must_use]
    pub fn last(&self) -> Option<&JournalEntry> {
        self.entries.last()
    }

    /// Records a migration.
    pub fn append(&mut self, tag: impl Into<String>, breakpoints: bool) -> &JournalEntry {
        let idx = self.next_idx();
        self.entries.push(JournalEntry {
            idx,
            version: SNAPSHOT_VERSION.to_string(),
            when: Utc::now().timestamp_millis(),
            tag: tag.into(),
            breakpoints,
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Writes the journal, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }
}

/// Builds a migration file stem: `0003_add_email`.
#[must_use]
pub fn migration_tag(idx: u32, name: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{idx:04}_{slug}")
}

// ============================================================================
// Migrations directory
// ============================================================================

/// A directory of migrations with its `meta/` folder.
#[derive(Debug, Clone)]
pub struct MigrationDir {
    root: PathBuf,
}

impl MigrationDir {
    /// Opens `root`; nothing is created until [`MigrationDir::write`].
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the journal.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.root.join("meta").join("_journal.json")
    }

    /// Path of the snapshot written with migration `idx`.
    #[must_use]
    pub fn snapshot_path(&self, idx: u32) -> PathBuf {
        self.root.join("meta").join(format!("{idx:04}_snapshot.json"))
    }

    /// Path of the SQL file for `tag`.
    #[must_use]
    pub fn sql_path(&self, tag: &str) -> PathBuf {
        self.root.join(format!("{tag}.sql"))
    }

    /// Snapshot of the last journal entry, or the empty schema.
    pub fn latest_snapshot(&self) -> Result<Snapshot> {
        let journal = Journal::load_or_default(&self.journal_path())?;
        match journal.last() {
            Some(entry) => Snapshot::load(&self.snapshot_path(entry.idx)),
            None => Ok(Snapshot::empty()),
        }
    }

    /// Writes the SQL file and snapshot of a new migration and records it
    /// in the journal.
    pub fn write(
        &self,
        name: &str,
        sql: &str,
        snapshot: &Snapshot,
        breakpoints: bool,
    ) -> Result<JournalEntry> {
        let journal_path = self.journal_path();
        let mut journal = Journal::load_or_default(&journal_path)?;
        let tag = migration_tag(journal.next_idx(), name);
        let entry = journal.append(tag, breakpoints).clone();

        let sql_path = self.sql_path(&entry.tag);
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(&sql_path, sql)?;
        snapshot.save(&self.snapshot_path(entry.idx))?;
        journal.save(&journal_path)?;

        info!(tag = %entry.tag, path = %sql_path.display(), "Wrote migration");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::interim::{interim_to_ddl, InterimColumn, InterimSchema};
    use tempfile::TempDir;

    fn users() -> SqliteDdl {
        let schema = InterimSchema::new().table(
            "users",
            vec![
                InterimColumn::new("users", "id", "integer").primary_key(),
                InterimColumn::new("users", "email", "text").not_null().unique(),
            ],
        );
        let (ddl, errors) = interim_to_ddl(&schema);
        assert!(errors.is_empty());
        ddl
    }

    #[test]
    fn test_migration_tag() {
        assert_eq!(migration_tag(3, "add email"), "0003_add_email");
        assert_eq!(migration_tag(12, "Init"), "0012_init");
    }

    #[test]
    fn test_snapshot_restores_the_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta").join("0000_snapshot.json");
        let ddl = users();

        let snapshot = Snapshot::from_ddl(&ddl, ORIGIN_ID, vec!["people->users".into()]);
        snapshot.save(&path).unwrap();
        let loaded = Snapshot::load(&path).unwrap();

        assert_eq!(loaded, snapshot);
        assert_ne!(loaded.id, ORIGIN_ID);
        assert_eq!(loaded.to_ddl().unwrap(), ddl);
    }

    #[test]
    fn test_snapshot_rejects_other_dialects() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        let mut snapshot = Snapshot::empty();
        snapshot.dialect = "postgresql".into();
        std::fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();

        assert!(matches!(
            Snapshot::load(&path),
            Err(DdlError::DialectMismatch { .. })
        ));
    }

    #[test]
    fn test_journal_indexes_are_monotonic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("_journal.json");

        let mut journal = Journal::load_or_default(&path).unwrap();
        assert_eq!(journal.next_idx(), 0);
        journal.append("0000_init", true);
        journal.append("0001_add_email", false);
        journal.save(&path).unwrap();

        let journal = Journal::load_or_default(&path).unwrap();
        let idx: Vec<u32> = journal.entries.iter().map(|e| e.idx).collect();
        assert_eq!(idx, vec![0, 1]);
        assert!(!journal.entries[1].breakpoints);
        assert!(journal.entries[0].when <= journal.entries[1].when);
    }

    #[test]
    fn test_migration_dir_chains_snapshots() {
        let dir = TempDir::new().unwrap();
        let migrations = MigrationDir::new(dir.path().join("migrations"));
        assert_eq!(migrations.latest_snapshot().unwrap(), Snapshot::empty());

        let first = Snapshot::from_ddl(&users(), ORIGIN_ID, Vec::new());
        let entry = migrations
            .write("init", "CREATE TABLE \"users\" (\"id\" integer);", &first, true)
            .unwrap();
        assert_eq!(entry.tag, "0000_init");
        assert!(migrations.sql_path("0000_init").exists());

        let latest = migrations.latest_snapshot().unwrap();
        assert_eq!(latest.id, first.id);

        let second = Snapshot::from_ddl(&users(), latest.id.clone(), Vec::new());
        let entry = migrations.write("noop", "", &second, true).unwrap();
        assert_eq!(entry.idx, 1);
        assert_eq!(migrations.latest_snapshot().unwrap().prev_id, first.id);
    }

    #[test]
    fn test_snapshot_records_the_renames_it_was_generated_with() {
        let dir = TempDir::new().unwrap();
        let migrations = MigrationDir::new(dir.path());
        let renames = vec!["people->users".to_string()];
        let snapshot = Snapshot::from_ddl(&users(), ORIGIN_ID, renames.clone());
        migrations.write("rename", "", &snapshot, true).unwrap();

        let latest = migrations.latest_snapshot().unwrap();
        assert_eq!(latest.renames, renames);
        assert!(latest.to_ddl().unwrap().alters(&users()).is_empty());
    }
}
