//! Session persistence backends.
//!
//! A store keeps whole [`SessionRecord`]s keyed by numeric id. Saving an
//! existing id overwrites it; listing pages newest (largest id) first.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::session::SessionRecord;

/// File name prefix of a persisted session.
const FILE_PREFIX: &str = "session-";

/// File name suffix of a persisted session.
const FILE_SUFFIX: &str = ".json";

/// One session per `session-{id}.json` file in a directory.
#[derive(Clone, Debug)]
pub struct FileSessionStore {
    /// Directory holding the session files.
    dir: PathBuf,
}

/// Sessions held in memory, for tests and embedding.
#[derive(Clone, Debug, Default)]
pub struct InMemorySessionStore {
    /// Records keyed by id.
    records: BTreeMap<u64, SessionRecord>,
}

/// One page of a session listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page {
    /// Sessions on this page, newest first.
    pub items: Vec<SessionSummary>,
    /// Cursor for the next page, `None` on the last page.
    pub next_cursor: Option<u64>,
}

/// What a listing shows about one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    /// Session id.
    pub id: u64,
    /// Number of top-level messages.
    pub message_count: usize,
    /// Session title.
    pub summary: String,
}

/// Load/save access to persisted sessions.
pub trait SessionStore {
    /// One page of sessions with ids strictly below `cursor` (all ids when
    /// `None`), newest first. A `page_size` of zero is treated as one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn list_page(&self, cursor: Option<u64>, page_size: usize) -> Result<Page, Error>;

    /// Load one session, `None` if no session has this id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or the record is corrupt.
    fn load_one(&self, id: u64) -> Result<Option<SessionRecord>, Error>;

    /// Save a session, assigning the next free id when `record.id` is unset.
    /// Returns the id the record was saved under.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn save(&mut self, record: &mut SessionRecord) -> Result<u64, Error>;
}

impl FileSessionStore {
    /// Ids of every session file present, ascending.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the directory exists but cannot be read.
    fn ids(&self) -> Result<Vec<u64>, Error> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in walkdir::WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(id) = parse_file_name(&entry.file_name().to_string_lossy()) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        return Ok(ids);
    }

    /// Create a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        return Self { dir };
    }

    /// Path of the file holding session `id`.
    #[must_use]
    pub fn path_for(&self, id: u64) -> PathBuf {
        return self.dir.join(format!("{FILE_PREFIX}{id}{FILE_SUFFIX}"));
    }

    /// Read and validate one session file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` or `Error::Json` on unreadable content, or
    /// `Error::SessionCorrupt` if the stored id disagrees with the file name.
    fn read(path: &Path, id: u64) -> Result<Option<SessionRecord>, Error> {
        let content = match std::fs::read_to_string(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };
        let mut record = SessionRecord::from_json(&content)?;
        match record.id {
            Some(stored) if stored != id => {
                return Err(Error::SessionCorrupt {
                    reason: format!("{} holds session {stored}", path.display()),
                });
            },
            Some(_) => {},
            None => record.id = Some(id),
        }
        return Ok(Some(record));
    }
}

impl SessionStore for FileSessionStore {
    fn list_page(&self, cursor: Option<u64>, page_size: usize) -> Result<Page, Error> {
        let (ids, next_cursor) = select_page(self.ids()?, cursor, page_size);
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = Self::read(&self.path_for(id), id)? {
                items.push(summarize(id, &record));
            }
        }
        return Ok(Page { items, next_cursor });
    }

    fn load_one(&self, id: u64) -> Result<Option<SessionRecord>, Error> {
        return Self::read(&self.path_for(id), id);
    }

    fn save(&mut self, record: &mut SessionRecord) -> Result<u64, Error> {
        std::fs::create_dir_all(&self.dir)?;
        let id = match record.id {
            Some(id) => id,
            None => next_free(self.ids()?.last().copied()),
        };
        record.id = Some(id);

        let path = self.path_for(id);
        std::fs::write(&path, record.to_json()?)?;
        tracing::debug!(id, path = %path.display(), "session saved");
        return Ok(id);
    }
}

impl InMemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        return Self::default();
    }
}

impl SessionStore for InMemorySessionStore {
    fn list_page(&self, cursor: Option<u64>, page_size: usize) -> Result<Page, Error> {
        let (ids, next_cursor) = select_page(self.records.keys().copied().collect(), cursor, page_size);
        let items = ids
            .into_iter()
            .filter_map(|id| return self.records.get(&id).map(|record| return summarize(id, record)))
            .collect();
        return Ok(Page { items, next_cursor });
    }

    fn load_one(&self, id: u64) -> Result<Option<SessionRecord>, Error> {
        return Ok(self.records.get(&id).cloned());
    }

    fn save(&mut self, record: &mut SessionRecord) -> Result<u64, Error> {
        let id = match record.id {
            Some(id) => id,
            None => next_free(self.records.keys().next_back().copied()),
        };
        record.id = Some(id);
        self.records.insert(id, record.clone());
        return Ok(id);
    }
}

/// Id following the largest one in use; sessions are numbered from 1.
fn next_free(largest: Option<u64>) -> u64 {
    return largest.map_or(1, |id| return id.saturating_add(1));
}

/// Session id encoded in a `session-{id}.json` file name.
fn parse_file_name(name: &str) -> Option<u64> {
    return name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?.parse().ok();
}

/// Pick one page out of ascending `ids`: newest first, strictly below
/// `cursor`. Returns the page and the cursor for the next one.
fn select_page(ids: Vec<u64>, cursor: Option<u64>, page_size: usize) -> (Vec<u64>, Option<u64>) {
    let size = page_size.max(1);
    let mut below: Vec<u64> = ids
        .into_iter()
        .rev()
        .filter(|id| return cursor.is_none_or(|c| return *id < c))
        .collect();
    let more = below.len() > size;
    below.truncate(size);
    let next_cursor = if more { below.last().copied() } else { None };
    return (below, next_cursor);
}

/// Listing entry for one record.
fn summarize(id: u64, record: &SessionRecord) -> SessionSummary {
    return SessionSummary {
        id,
        message_count: record.messages.len(),
        summary: record.summary.clone(),
    };
}
