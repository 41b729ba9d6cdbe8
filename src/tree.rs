//! Structural edits on the folder tree.
//!
//! Every operation runs inside one transaction: rows are read, their paths
//! and checksums recomputed, written back, and committed together. A failure
//! anywhere drops the transaction, which rolls it back. The config file is
//! only touched after a successful commit.

use std::ops::AddAssign;

use rusqlite::Transaction;
use serde::Serialize;

use crate::checksum::{FolderId, ROOT_FOLDER_ID};
use crate::error::{Error, Result};
use crate::index::{FolderRecord, Index, IndexConn, SongRecord};
use crate::path::NormalizedPath;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TreeStat {
    pub folders_moved: usize,
    pub folders_removed: usize,
    pub songs_moved: usize,
    pub songs_removed: usize,
    /// Songs whose stored path was not under their folder. They keep only
    /// their file name at the new location.
    pub songs_flattened: usize,
}

impl AddAssign for TreeStat {
    fn add_assign(&mut self, other: TreeStat) {
        self.folders_moved += other.folders_moved;
        self.folders_removed += other.folders_removed;
        self.songs_moved += other.songs_moved;
        self.songs_removed += other.songs_removed;
        self.songs_flattened += other.songs_flattened;
    }
}

/// Which of two songs with the same relative path survives a merge.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Keep {
    Surviving,
    Incoming,
}

pub trait MergePolicy {
    fn resolve(&mut self, surviving: &SongRecord, incoming: &SongRecord) -> Keep;
}

impl<F> MergePolicy for F
where
    F: FnMut(&SongRecord, &SongRecord) -> Keep,
{
    fn resolve(&mut self, surviving: &SongRecord, incoming: &SongRecord) -> Keep {
        self(surviving, incoming)
    }
}

/// Moves a song file path from under `src` to under `dst`. Paths not under
/// `src` keep only their file name, and the flag says so.
fn rebase_song_path(song_path: &str, src: &NormalizedPath, dst: &NormalizedPath) -> (String, bool) {
    let sep = dst.separator().as_char();

    let (rest, flattened) = match song_path.strip_prefix(src.as_str()) {
        Some(rest) => (rest, false),
        None => {
            warn!("song '{}' is not under its folder '{}'", song_path, src);
            match song_path.rfind(|c| c == '/' || c == '\\') {
                Some(pos) => (&song_path[pos + 1..], true),
                None => (song_path, true),
            }
        }
    };

    let mut result = dst.as_str().to_string();
    for c in rest.chars() {
        result.push(if c == '/' || c == '\\' { sep } else { c });
    }
    (result, flattened)
}

fn finish(tx: Transaction, dry_run: bool) -> Result<()> {
    if dry_run {
        info!("dry run, rolling back");
        tx.rollback()?;
    } else {
        tx.commit()?;
    }
    Ok(())
}

impl<'a> IndexConn<'a> {
    fn require_folder(&self, path: &NormalizedPath) -> Result<FolderRecord> {
        if self.deriver().is_root(path) {
            return Err(Error::InvalidPath(format!(
                "{} is a root directory",
                path
            )));
        }

        match self.folder(path)? {
            Some(folder) => Ok(folder),
            None => Err(Error::NotFound(path.to_string())),
        }
    }

    /// The parent id for a folder placed at `path`. Its parent must be a
    /// root, the top of a root, or an indexed folder.
    fn attach_point(&self, path: &NormalizedPath) -> Result<FolderId> {
        let parent_id = self.deriver().parent_id(path)?;

        if parent_id == ROOT_FOLDER_ID {
            return Ok(parent_id);
        }

        match path.parent() {
            Some(parent) if self.folder_exists(&parent)? => Ok(parent_id),
            Some(parent) => Err(Error::NotFound(parent.to_string())),
            None => Ok(ROOT_FOLDER_ID),
        }
    }

    fn relocate_songs(
        &self,
        folder: &FolderRecord,
        path: &NormalizedPath,
        id: FolderId,
        parent: FolderId,
    ) -> Result<TreeStat> {
        let mut stat = TreeStat::default();

        for song in self.songs_by_folder(folder.id)? {
            let (song_path, flattened) = rebase_song_path(&song.path, &folder.path, path);
            self.update_song(&song.path, &song_path, id, parent)?;

            stat.songs_moved += 1;
            if flattened {
                stat.songs_flattened += 1;
            }
        }

        Ok(stat)
    }

    /// Rewrites `src` and everything below it to live at `dest`, with
    /// `dest_parent` as the new parent of `src` itself.
    fn relocate(
        &self,
        src: &FolderRecord,
        dest: &NormalizedPath,
        dest_parent: FolderId,
    ) -> Result<TreeStat> {
        let mut stat = TreeStat::default();

        let subtree = self.subtree(&src.path)?;

        let mut moves = Vec::with_capacity(subtree.len());
        for folder in subtree {
            let path = folder.path.graft(&src.path, dest)?;
            if self.folder_exists(&path)? {
                return Err(Error::AlreadyExists(path.to_string()));
            }
            moves.push((folder, path));
        }

        for (folder, path) in &moves {
            let id = self.deriver().derive_id(path)?;

            let (parent, title) = if folder.path == src.path {
                (dest_parent, path.file_name().to_string())
            } else {
                (self.deriver().parent_id(path)?, folder.title.clone())
            };

            self.update_folder(&folder.path, path, parent, &title)?;
            stat.folders_moved += 1;

            stat += self.relocate_songs(folder, path, id, parent)?;
        }

        Ok(stat)
    }

    pub(crate) fn move_folder(&self, src: &NormalizedPath, dest: &NormalizedPath) -> Result<TreeStat> {
        let folder = self.require_folder(src)?;

        if src == dest {
            debug!("'{}' is already in place", src);
            return Ok(TreeStat::default());
        }

        if dest.is_bare() {
            return Err(Error::InvalidPath(dest.to_string()));
        }

        if self.deriver().is_root(dest) {
            return Err(Error::AlreadyExists(dest.to_string()));
        }

        if dest.is_descendant_of(src) {
            return Err(Error::InvalidPath(format!("{} is inside {}", dest, src)));
        }

        if self.folder_exists(dest)? {
            return Err(Error::AlreadyExists(dest.to_string()));
        }

        let dest_parent = self.attach_point(dest)?;

        self.relocate(&folder, dest, dest_parent)
    }

    /// Whether `root` still needs its bookkeeping row. Roots may not nest,
    /// and anything already stored literally under `root` would be out of
    /// reach once it is a root, so both are refused.
    fn claim_root(&self, root: &NormalizedPath) -> Result<bool> {
        for existing in self.deriver().roots() {
            if root.starts_with(existing) || existing.starts_with(root) {
                return Err(Error::InvalidPath(format!(
                    "{} overlaps root {}",
                    root, existing
                )));
            }
        }

        let mut present = false;
        for folder in self.subtree(root)? {
            if folder.path == *root && folder.parent == ROOT_FOLDER_ID {
                present = true;
            } else {
                return Err(Error::AlreadyExists(folder.path.to_string()));
            }
        }

        if self.count_songs_under(root)? > 0 {
            return Err(Error::AlreadyExists(format!("songs under {}", root)));
        }

        Ok(!present)
    }

    pub(crate) fn delete_folder(&self, path: &NormalizedPath) -> Result<TreeStat> {
        self.require_folder(path)?;

        let mut stat = TreeStat::default();

        for folder in self.subtree(path)? {
            stat.songs_removed += self.delete_songs_by_folder(folder.id)?;
            stat.folders_removed += self.delete_folder_row(&folder.path)?;
        }

        Ok(stat)
    }

    fn merge_into(
        &self,
        survivor: &FolderRecord,
        other: &FolderRecord,
        policy: &mut dyn MergePolicy,
    ) -> Result<TreeStat> {
        let mut stat = TreeStat::default();

        for song in self.songs_by_folder(other.id)? {
            let (target, flattened) = rebase_song_path(&song.path, &other.path, &survivor.path);
            if flattened {
                stat.songs_flattened += 1;
            }

            match self.song(&target)? {
                Some(existing) => match policy.resolve(&existing, &song) {
                    Keep::Surviving => {
                        self.delete_song(&song.path)?;
                        stat.songs_removed += 1;
                    }
                    Keep::Incoming => {
                        self.delete_song(&existing.path)?;
                        self.update_song(&song.path, &target, survivor.id, survivor.parent)?;
                        stat.songs_removed += 1;
                        stat.songs_moved += 1;
                    }
                },
                None => {
                    self.update_song(&song.path, &target, survivor.id, survivor.parent)?;
                    stat.songs_moved += 1;
                }
            }
        }

        // shallowest first, so a folder is handled before anything under it
        for folder in self.subtree(&other.path)?.into_iter().skip(1) {
            if !self.folder_exists(&folder.path)? {
                continue;
            }

            let counterpart = folder.path.graft(&other.path, &survivor.path)?;

            match self.folder(&counterpart)? {
                Some(existing) => stat += self.merge_into(&existing, &folder, policy)?,
                None => {
                    let parent = self.deriver().parent_id(&counterpart)?;
                    stat += self.relocate(&folder, &counterpart, parent)?;
                }
            }
        }

        stat.songs_removed += self.delete_songs_by_folder(other.id)?;
        stat.folders_removed += self.delete_folder_row(&other.path)?;

        Ok(stat)
    }

    pub(crate) fn merge_folders(
        &self,
        survivor: &NormalizedPath,
        duplicate: &NormalizedPath,
        policy: &mut dyn MergePolicy,
    ) -> Result<TreeStat> {
        let kept = self.require_folder(survivor)?;
        let other = self.require_folder(duplicate)?;

        if survivor.starts_with(duplicate) || duplicate.starts_with(survivor) {
            return Err(Error::InvalidPath(format!(
                "cannot merge {} with {}",
                duplicate, survivor
            )));
        }

        self.merge_into(&kept, &other, policy)
    }
}

impl Index {
    pub fn move_folder(&mut self, src: &str, dest: &str) -> Result<TreeStat> {
        let src = self.resolve(src)?;
        let dest = self.resolve(dest)?;

        info!("move '{}' -> '{}'", src, dest);

        let tx = self.conn.transaction()?;
        let stat = IndexConn::new(&tx, &self.deriver).move_folder(&src, &dest)?;
        finish(tx, self.dry_run)?;

        info!("moved '{}': {:?}", src, stat);

        Ok(stat)
    }

    /// Removes a folder, everything below it, and their songs. A missing
    /// folder is `NotFound`, so a repeated delete fails.
    pub fn delete_folder(&mut self, path: &str) -> Result<TreeStat> {
        let path = self.resolve(path)?;

        info!("delete '{}'", path);

        let tx = self.conn.transaction()?;
        let stat = IndexConn::new(&tx, &self.deriver).delete_folder(&path)?;
        finish(tx, self.dry_run)?;

        info!("deleted '{}': {:?}", path, stat);

        Ok(stat)
    }

    /// Folds `duplicate` into `survivor`. Songs sharing a relative path are
    /// settled by `policy`; subfolders with matching names merge in turn.
    pub fn merge_folders(
        &mut self,
        survivor: &str,
        duplicate: &str,
        policy: &mut dyn MergePolicy,
    ) -> Result<TreeStat> {
        let survivor = self.resolve(survivor)?;
        let duplicate = self.resolve(duplicate)?;

        info!("merge '{}' into '{}'", duplicate, survivor);

        let tx = self.conn.transaction()?;
        let stat = IndexConn::new(&tx, &self.deriver).merge_folders(&survivor, &duplicate, policy)?;
        finish(tx, self.dry_run)?;

        info!("merged '{}': {:?}", duplicate, stat);

        Ok(stat)
    }

    pub fn add_root_folder(&mut self, raw: &str) -> Result<()> {
        let root = crate::path::normalize(raw, self.deriver.separator())?;

        if !root.is_absolute() {
            return Err(Error::InvalidPath(root.to_string()));
        }
        if self.deriver.is_root(&root) {
            return Err(Error::AlreadyExists(root.to_string()));
        }

        info!("add root '{}'", root);

        let tx = self.conn.transaction()?;
        {
            let access = IndexConn::new(&tx, &self.deriver);
            if access.claim_root(&root)? {
                access.insert_root_folder(&root, chrono::Utc::now().timestamp())?;
            } else {
                debug!("root folder row '{}' already present", root);
            }
        }
        finish(tx, self.dry_run)?;

        if self.dry_run {
            return Ok(());
        }

        self.deriver.roots_mut().push(root)?;
        self.save_roots()
    }

    /// Drops a root from the root list along with its bookkeeping row. Songs
    /// and folders under it are left to the player's next scan.
    pub fn remove_root_folder(&mut self, raw: &str) -> Result<()> {
        let root = crate::path::normalize(raw, self.deriver.separator())?;

        if !self.deriver.is_root(&root) {
            return Err(Error::NotFound(root.to_string()));
        }

        info!("remove root '{}'", root);

        let tx = self.conn.transaction()?;
        IndexConn::new(&tx, &self.deriver).delete_folder_row(&root)?;
        finish(tx, self.dry_run)?;

        if self.dry_run {
            return Ok(());
        }

        self.deriver.roots_mut().remove(&root)?;
        self.save_roots()
    }

    fn save_roots(&self) -> Result<()> {
        match &self.config {
            Some(config) => {
                if let Err(e) = config.save(self.deriver.roots()) {
                    error!("index updated but root list not saved: {}", e);
                    return Err(e);
                }
                Ok(())
            }
            None => {
                debug!("no root config, index only");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{self, Separator};

    fn p(s: &str) -> NormalizedPath {
        path::normalize(s, Separator::Slash).unwrap()
    }

    #[test]
    fn rebases_song_paths() {
        assert_eq!(
            rebase_song_path("songs/Foo/a.bms", &p("songs/Foo"), &p("songs/Bar")),
            ("songs/Bar/a.bms".to_string(), false)
        );
        assert_eq!(
            rebase_song_path("songs/Foo/sub/a.bms", &p("songs/Foo"), &p("D:/x")),
            ("D:/x/sub/a.bms".to_string(), false)
        );
        assert_eq!(
            rebase_song_path("elsewhere\\deep\\a.bms", &p("songs/Foo"), &p("songs/Bar")),
            ("songs/Bar/a.bms".to_string(), true)
        );
    }

    #[test]
    fn stats_accumulate() {
        let mut stat = TreeStat {
            folders_moved: 1,
            ..Default::default()
        };
        stat += TreeStat {
            folders_moved: 2,
            songs_removed: 3,
            songs_flattened: 1,
            ..Default::default()
        };
        assert_eq!(stat.folders_moved, 3);
        assert_eq!(stat.songs_removed, 3);
        assert_eq!(stat.songs_flattened, 1);
    }
}
