//! Folder identifiers.
//!
//! The player keys every folder by a CRC-32 of its root-relative path and
//! stores that value, as unpadded lowercase hex, both as the folder's
//! identity and as each child's `parent`. Identifiers are always recomputed
//! from the path here, never cached.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection};
use serde::{Serialize, Serializer};

use crate::error::Result;
use crate::path::{NormalizedPath, Separator};
use crate::roots::RootSet;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FolderId(pub u32);

/// Parent of every root-level folder.
pub const ROOT_FOLDER_ID: FolderId = FolderId(0xe297_7170);

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // no zero padding, stored ids can be seven characters
        write!(f, "{:x}", self.0)
    }
}

impl FromStr for FolderId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<FolderId, Self::Err> {
        u32::from_str_radix(s, 16).map(FolderId)
    }
}

impl ToSql for FolderId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for FolderId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<FolderId> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl Serialize for FolderId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

const CRC32_POLYNOMIAL: u32 = 0xedb8_8320;

const fn crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC32_POLYNOMIAL
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC32_TABLE: [u32; 256] = crc32_table();

fn crc32_update(crc: u32, input: u32) -> u32 {
    let x = crc ^ input;
    CRC32_TABLE[(x & 0xff) as usize] ^ (x >> 8)
}

/// Turns a root-relative remainder (no trailing separator) into a checksum.
pub trait PathHasher: Send + Sync {
    fn hash(&self, remainder: &str) -> u32;
}

/// The player's own derivation: CRC-32 over `remainder + "\\\0"`, with each
/// byte sign-extended to 32 bits before it is folded in.
#[derive(Debug, Default, Clone, Copy)]
pub struct JavaCrc32;

impl PathHasher for JavaCrc32 {
    fn hash(&self, remainder: &str) -> u32 {
        let crc = remainder
            .bytes()
            .chain(b"\\\0".iter().copied())
            .fold(0xffff_ffff, |crc, b| crc32_update(crc, b as i8 as u32));
        !crc
    }
}

/// Plain CRC-32 of the remainder bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct Crc32;

impl PathHasher for Crc32 {
    fn hash(&self, remainder: &str) -> u32 {
        let crc = remainder
            .bytes()
            .fold(0xffff_ffff, |crc, b| crc32_update(crc, b as u32));
        !crc
    }
}

pub struct ChecksumDeriver {
    roots: RootSet,
    separator: Separator,
    hasher: Box<dyn PathHasher>,
}

impl fmt::Debug for ChecksumDeriver {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ChecksumDeriver")
            .field("roots", &self.roots)
            .field("separator", &self.separator)
            .finish()
    }
}

impl ChecksumDeriver {
    /// Binds to a snapshot of the roots. The separator is the one the index
    /// was built with.
    pub fn from_roots(roots: RootSet, separator: Separator) -> ChecksumDeriver {
        ChecksumDeriver {
            roots,
            separator,
            hasher: Box::new(JavaCrc32),
        }
    }

    /// Rebuilds the roots from the index itself: the absolute folder rows
    /// hanging off the root sentinel. A root's content is stored relative
    /// to it, so a candidate with absolute rows below it is a literal
    /// top-level folder (`/pack/` on posix) rather than a root. An empty
    /// literal top-level folder cannot be told apart from a root.
    pub fn from_index(conn: &Connection, separator: Separator) -> Result<ChecksumDeriver> {
        let mut st = conn.prepare("SELECT path, parent FROM folder ORDER BY path")?;
        let mut rows = st.query(params![])?;

        let mut candidates = Vec::new();
        let mut absolute = Vec::new();
        while let Some(row) = rows.next()? {
            let path: String = row.get(0)?;
            let parent = row.get::<_, FolderId>(1).ok();

            match NormalizedPath::parse(&path) {
                Ok(p) if p.is_absolute() => {
                    let p = p.with_separator(separator);
                    if parent == Some(ROOT_FOLDER_ID) {
                        candidates.push(p.clone());
                    }
                    absolute.push(p);
                }
                _ => trace!("folder '{}' is not a root directory", path),
            }
        }

        let paths: Vec<NormalizedPath> = candidates
            .into_iter()
            .filter(|c| {
                let literal = absolute.iter().any(|a| a.is_descendant_of(c));
                if literal {
                    debug!("'{}' has absolute rows below it, not a root", c);
                }
                !literal
            })
            .collect();

        let mut roots = RootSet::new();
        for path in paths {
            if let Err(e) = roots.push(path) {
                warn!("skipping root: {}", e);
            }
        }

        debug!("roots from index: {:?}", roots);

        Ok(ChecksumDeriver::from_roots(roots, separator))
    }

    pub fn with_hasher<H: PathHasher + 'static>(mut self, hasher: H) -> ChecksumDeriver {
        self.hasher = Box::new(hasher);
        self
    }

    pub fn roots(&self) -> &RootSet {
        &self.roots
    }

    pub(crate) fn roots_mut(&mut self) -> &mut RootSet {
        &mut self.roots
    }

    pub fn separator(&self) -> Separator {
        self.separator
    }

    pub fn is_root(&self, path: &NormalizedPath) -> bool {
        self.roots.contains(path)
    }

    /// The spelling of `path` in the index: relative to its root, the root
    /// itself for a root, or unchanged when no root matches.
    pub fn to_index_path(&self, path: &NormalizedPath) -> Result<NormalizedPath> {
        let root = match self.roots.longest_match(path)? {
            Some(root) => root,
            None => return Ok(path.clone()),
        };

        match path.strip_prefix(root) {
            Some(rest) if !rest.is_empty() => NormalizedPath::parse(&format!(
                "{}{}",
                rest,
                path.separator().as_char()
            )),
            _ => Ok(root.clone()),
        }
    }

    pub fn derive_id(&self, path: &NormalizedPath) -> Result<FolderId> {
        let remainder = match self.roots.longest_match(path)? {
            Some(root) => path.strip_prefix(root).unwrap_or(""),
            None => path.trimmed(),
        };

        if remainder.is_empty() || path.is_bare() {
            return Ok(ROOT_FOLDER_ID);
        }

        Ok(FolderId(self.hasher.hash(remainder)))
    }

    /// The `parent` value a folder at `path` must carry.
    pub fn parent_id(&self, path: &NormalizedPath) -> Result<FolderId> {
        if self.is_root(path) {
            return Ok(ROOT_FOLDER_ID);
        }

        match path.parent() {
            Some(parent) => self.derive_id(&parent),
            None => Ok(ROOT_FOLDER_ID),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::path::normalize;

    fn deriver(roots: &[&str], sep: Separator) -> ChecksumDeriver {
        ChecksumDeriver::from_roots(RootSet::from_paths(roots, sep).unwrap(), sep)
    }

    #[test]
    fn java_crc_matches_player_values() {
        assert_eq!(JavaCrc32.hash("songs"), 0x7904_6a80);
        assert_eq!(JavaCrc32.hash("songs\\Foo"), 0x259b_ffb4);
        assert_eq!(JavaCrc32.hash("songs/Foo"), 0xa82d_80db);
        // bytes above 0x7f are sign-extended
        assert_eq!(JavaCrc32.hash("日本"), 0x7ea6_a372);
    }

    #[test]
    fn plain_crc_matches_check_value() {
        assert_eq!(Crc32.hash("123456789"), 0xcbf4_3926);
        assert_eq!(Crc32.hash("日本"), 0xc7b7_cdcc);
    }

    #[test]
    fn folder_id_hex_round_trip() {
        assert_eq!(ROOT_FOLDER_ID.to_string(), "e2977170");
        assert_eq!(FolderId(0x0abc_def1).to_string(), "abcdef1");
        assert_eq!("abcdef1".parse::<FolderId>().unwrap(), FolderId(0x0abc_def1));
    }

    #[test]
    fn absolute_and_relative_forms_agree() {
        let d = deriver(&["C:/bms"], Separator::Backslash);

        let absolute = normalize("C:/bms/songs/Foo", Separator::Backslash).unwrap();
        let relative = normalize("songs\\Foo\\", Separator::Backslash).unwrap();

        assert_eq!(d.derive_id(&absolute).unwrap(), FolderId(0x259b_ffb4));
        assert_eq!(d.derive_id(&absolute).unwrap(), d.derive_id(&relative).unwrap());
        assert_eq!(d.to_index_path(&absolute).unwrap(), relative);
    }

    #[test]
    fn equivalent_raw_paths_share_an_id() {
        let d = deriver(&["C:/bms"], Separator::Slash);
        let raws = ["C:/bms/songs/Foo", "C:\\bms\\songs\\Foo\\", "C:/bms/songs/x/../Foo//"];

        let ids: Vec<FolderId> = raws
            .iter()
            .map(|r| d.derive_id(&normalize(r, Separator::Slash).unwrap()).unwrap())
            .collect();

        assert!(ids.iter().all(|id| *id == ids[0]));
    }

    #[test]
    fn roots_and_top_level_map_to_sentinel() {
        let d = deriver(&["C:/bms", "D:/more_bms"], Separator::Slash);
        let p = |s: &str| normalize(s, Separator::Slash).unwrap();

        assert_eq!(d.derive_id(&p("C:/bms/")).unwrap(), ROOT_FOLDER_ID);
        assert_eq!(d.derive_id(&p("/")).unwrap(), ROOT_FOLDER_ID);
        assert_eq!(d.parent_id(&p("songs/")).unwrap(), ROOT_FOLDER_ID);
        assert_eq!(d.parent_id(&p("D:/more_bms/")).unwrap(), ROOT_FOLDER_ID);
        assert_eq!(d.parent_id(&p("songs/Foo/")).unwrap(), d.derive_id(&p("songs/")).unwrap());
        assert_eq!(d.to_index_path(&p("D:/more_bms/")).unwrap(), p("D:/more_bms/"));
    }

    #[test]
    fn paths_outside_roots_hash_literally() {
        let d = deriver(&["C:/bms"], Separator::Slash);
        let path = normalize("E:/elsewhere/pack", Separator::Slash).unwrap();

        assert_eq!(d.to_index_path(&path).unwrap(), path);
        assert_eq!(d.derive_id(&path).unwrap(), FolderId(JavaCrc32.hash("E:/elsewhere/pack")));
    }

    #[test]
    fn renaming_an_ancestor_changes_descendant_parent() {
        let d = deriver(&["C:/bms"], Separator::Slash);
        let p = |s: &str| normalize(s, Separator::Slash).unwrap();

        assert_ne!(
            d.parent_id(&p("songs/Foo/chart/")).unwrap(),
            d.parent_id(&p("songs/Bar/chart/")).unwrap()
        );
    }

    #[test]
    fn hasher_is_swappable() {
        let d = deriver(&["C:/bms"], Separator::Slash).with_hasher(Crc32);
        let path = normalize("songs/Foo", Separator::Slash).unwrap();
        assert_eq!(d.derive_id(&path).unwrap(), FolderId(Crc32.hash("songs/Foo")));
    }

    #[test]
    fn duplicate_roots_fail() {
        let d = deriver(&["C:/bms", "C:/bms/"], Separator::Slash);
        let path = normalize("C:/bms/songs", Separator::Slash).unwrap();
        assert!(matches!(d.derive_id(&path), Err(Error::AmbiguousRoot { .. })));
    }
}
