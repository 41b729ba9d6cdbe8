//! Maintenance of a beatoraja `songdata.db` folder tree.
//!
//! Folder rows are keyed by a checksum of their root-relative path, and each
//! row carries its parent's checksum. Moving, deleting or merging a folder
//! therefore means rewriting every row below it. This crate does that inside
//! one transaction, and keeps the player's root list in `config_sys.json` in
//! step with the index.

#[macro_use]
extern crate log;

pub mod checksum;
pub mod config;
pub mod db_meta;
pub mod error;
pub mod index;
pub mod logger;
pub mod path;
pub mod roots;
pub mod schema;
pub mod tree;

pub use crate::checksum::{ChecksumDeriver, Crc32, FolderId, JavaCrc32, PathHasher, ROOT_FOLDER_ID};
pub use crate::config::{JsonRootConfig, RootStore};
pub use crate::error::{Error, Result};
pub use crate::index::{FolderRecord, Index, SongRecord};
pub use crate::path::{normalize, NormalizedPath, Separator};
pub use crate::roots::RootSet;
pub use crate::tree::{Keep, MergePolicy, TreeStat};
