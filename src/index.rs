use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::checksum::{ChecksumDeriver, FolderId, ROOT_FOLDER_ID};
use crate::config::RootStore;
use crate::db_meta;
use crate::error::Result;
use crate::path::{self, NormalizedPath, Separator};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderRecord {
    /// Derived from `path` when the row is read.
    pub id: FolderId,
    pub path: NormalizedPath,
    pub parent: FolderId,
    pub title: String,
    pub date: i64,
    pub adddate: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongRecord {
    pub path: String,
    pub folder: FolderId,
    pub parent: FolderId,
    pub title: String,
    pub md5: String,
    pub sha256: String,
}

/// Row access shared by plain reads and the mutation transactions.
pub(crate) struct IndexConn<'a> {
    conn: &'a Connection,
    deriver: &'a ChecksumDeriver,
}

impl<'a> IndexConn<'a> {
    pub fn new(conn: &'a Connection, deriver: &'a ChecksumDeriver) -> IndexConn<'a> {
        IndexConn { conn, deriver }
    }

    pub fn deriver(&self) -> &ChecksumDeriver {
        self.deriver
    }

    fn _get_folder(&self, row: &Row) -> Result<FolderRecord> {
        let path: String = row.get(0)?;
        let path = NormalizedPath::parse(&path)?;

        Ok(FolderRecord {
            id: self.deriver.derive_id(&path)?,
            path,
            parent: row.get(1)?,
            title: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            date: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
            adddate: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
        })
    }

    fn _get_song(row: &Row) -> Result<SongRecord> {
        Ok(SongRecord {
            path: row.get(0)?,
            folder: row.get(1)?,
            parent: row.get(2)?,
            title: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            md5: row.get(4)?,
            sha256: row.get(5)?,
        })
    }

    pub fn folder(&self, path: &NormalizedPath) -> Result<Option<FolderRecord>> {
        trace!("get folder path='{}'", path);

        let mut st = self.conn.prepare(
            "SELECT path, parent, title, date, adddate
            FROM folder
            WHERE path = ?",
        )?;

        let mut rows = st.query(params![path.as_str()])?;

        if let Some(row) = rows.next()? {
            Ok(Some(self._get_folder(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn folder_exists(&self, path: &NormalizedPath) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM folder WHERE path = ?",
                params![path.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(found.is_some())
    }

    /// The folder at `path` and every folder below it, shallowest first.
    pub fn subtree(&self, path: &NormalizedPath) -> Result<Vec<FolderRecord>> {
        trace!("list subtree path='{}'", path);

        let mut st = self.conn.prepare(
            "SELECT path, parent, title, date, adddate
            FROM folder
            WHERE substr(path, 1, length(?1)) = ?1
            ORDER BY length(path), path",
        )?;

        let mut rows = st.query(params![path.as_str()])?;

        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(self._get_folder(row)?);
        }

        Ok(result)
    }

    pub fn folders_by_parent(&self, parent: FolderId) -> Result<Vec<FolderRecord>> {
        trace!("list folders by parent={}", parent);

        let mut st = self.conn.prepare(
            "SELECT path, parent, title, date, adddate
            FROM folder
            WHERE parent = ?
            ORDER BY path",
        )?;

        let mut rows = st.query(params![parent])?;

        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(self._get_folder(row)?);
        }

        Ok(result)
    }

    pub fn update_folder(
        &self,
        old_path: &NormalizedPath,
        path: &NormalizedPath,
        parent: FolderId,
        title: &str,
    ) -> Result<()> {
        debug!("folder '{}' -> '{}' parent={}", old_path, path, parent);

        self.conn.execute(
            "UPDATE folder SET path = ?, parent = ?, title = ? WHERE path = ?",
            params![path.as_str(), parent, title, old_path.as_str()],
        )?;

        Ok(())
    }

    pub fn insert_root_folder(&self, path: &NormalizedPath, now: i64) -> Result<()> {
        debug!("create root folder '{}'", path);

        self.conn.execute(
            "INSERT INTO folder (title, subtitle, command, path, banner, parent, type, date, adddate, max)
            VALUES (?, '', '', ?, '', ?, 0, ?, ?, 0)",
            params![path.file_name(), path.as_str(), ROOT_FOLDER_ID, now, now],
        )?;

        Ok(())
    }

    pub fn delete_folder_row(&self, path: &NormalizedPath) -> Result<usize> {
        trace!("delete folder path='{}'", path);

        Ok(self
            .conn
            .execute("DELETE FROM folder WHERE path = ?", params![path.as_str()])?)
    }

    pub fn songs_by_folder(&self, folder: FolderId) -> Result<Vec<SongRecord>> {
        trace!("list songs by folder={}", folder);

        let mut st = self.conn.prepare(
            "SELECT path, folder, parent, title, md5, sha256
            FROM song
            WHERE folder = ?
            ORDER BY path",
        )?;

        let mut rows = st.query(params![folder])?;

        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(Self::_get_song(row)?);
        }

        Ok(result)
    }

    pub fn song(&self, path: &str) -> Result<Option<SongRecord>> {
        trace!("get song path='{}'", path);

        let mut st = self.conn.prepare(
            "SELECT path, folder, parent, title, md5, sha256
            FROM song
            WHERE path = ?",
        )?;

        let mut rows = st.query(params![path])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::_get_song(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn update_song(
        &self,
        old_path: &str,
        path: &str,
        folder: FolderId,
        parent: FolderId,
    ) -> Result<()> {
        debug!("song '{}' -> '{}' folder={}", old_path, path, folder);

        self.conn.execute(
            "UPDATE song SET path = ?, folder = ?, parent = ? WHERE path = ?",
            params![path, folder, parent, old_path],
        )?;

        Ok(())
    }

    pub fn delete_song(&self, path: &str) -> Result<()> {
        debug!("delete song '{}'", path);

        self.conn
            .execute("DELETE FROM song WHERE path = ?", params![path])?;

        Ok(())
    }

    /// Songs whose stored path lies below `path`, whatever folder they name.
    pub fn count_songs_under(&self, path: &NormalizedPath) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM song WHERE substr(path, 1, length(?1)) = ?1",
            params![path.as_str()],
            |row| row.get(0),
        )?;

        Ok(count as usize)
    }

    pub fn delete_songs_by_folder(&self, folder: FolderId) -> Result<usize> {
        trace!("delete songs by folder={}", folder);

        Ok(self
            .conn
            .execute("DELETE FROM song WHERE folder = ?", params![folder])?)
    }
}

/// An open songdata.db together with the roots it was built against.
pub struct Index {
    pub(crate) conn: Connection,
    pub(crate) deriver: ChecksumDeriver,
    pub(crate) config: Option<Box<dyn RootStore>>,
    pub(crate) dry_run: bool,
}

impl Index {
    pub fn new(conn: Connection, deriver: ChecksumDeriver) -> Result<Index> {
        db_meta::verify_schema(&conn)?;

        info!(
            "using {} roots, separator {:?}",
            deriver.roots().len(),
            deriver.separator()
        );

        Ok(Index {
            conn,
            deriver,
            config: None,
            dry_run: false,
        })
    }

    /// Reads the roots from `config` and keeps it to record root changes.
    pub fn from_config(
        conn: Connection,
        config: Box<dyn RootStore>,
        separator: Separator,
    ) -> Result<Index> {
        let roots = config.load()?;
        let index = Index::new(conn, ChecksumDeriver::from_roots(roots, separator))?;
        Ok(index.with_config(config))
    }

    pub fn with_config(mut self, config: Box<dyn RootStore>) -> Index {
        self.config = Some(config);
        self
    }

    /// Run mutations to completion, report what they would do, then roll
    /// back. The config file is left alone.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    pub fn deriver(&self) -> &ChecksumDeriver {
        &self.deriver
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Normalizes a caller path into the index's spelling.
    pub fn resolve(&self, raw: &str) -> Result<NormalizedPath> {
        let path = path::normalize(raw, self.deriver.separator())?;
        self.deriver.to_index_path(&path)
    }

    pub(crate) fn access(&self) -> IndexConn<'_> {
        IndexConn::new(&self.conn, &self.deriver)
    }

    pub fn folder(&self, raw: &str) -> Result<Option<FolderRecord>> {
        let path = self.resolve(raw)?;
        self.access().folder(&path)
    }

    pub fn folders_by_parent(&self, parent: FolderId) -> Result<Vec<FolderRecord>> {
        self.access().folders_by_parent(parent)
    }

    pub fn songs_by_folder(&self, folder: FolderId) -> Result<Vec<SongRecord>> {
        self.access().songs_by_folder(folder)
    }

    pub fn song(&self, path: &str) -> Result<Option<SongRecord>> {
        self.access().song(path)
    }

    pub fn is_root_folder(&self, raw: &str) -> Result<bool> {
        let path = self.resolve(raw)?;
        Ok(self.deriver.is_root(&path))
    }
}
