//! Root directory list shared with the player through its `config_sys.json`.
//!
//! Only the `bmsroot` array is read or written; everything else in the
//! file belongs to the player and is written back exactly as it was read.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::path::{self, NormalizedPath, Separator};
use crate::roots::RootSet;

pub const ROOTS_FIELD: &str = "bmsroot";

/// Where the player's root list lives.
pub trait RootStore {
    fn load(&self) -> Result<RootSet>;
    fn save(&self, roots: &RootSet) -> Result<()>;
}

pub struct JsonRootConfig {
    path: PathBuf,
    separator: Separator,
}

impl JsonRootConfig {
    pub fn new<P: Into<PathBuf>>(path: P, separator: Separator) -> JsonRootConfig {
        JsonRootConfig {
            path: path.into(),
            separator,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error<E: std::fmt::Display>(&self, e: E) -> Error {
        Error::ConfigIo {
            path: self.path.to_string_lossy().into_owned(),
            message: e.to_string(),
        }
    }

    fn read_value(&self) -> Result<Value> {
        let text = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        let value: Value = serde_json::from_str(&text).map_err(|e| self.io_error(e))?;

        if !value.is_object() {
            return Err(self.io_error("not a JSON object"));
        }

        Ok(value)
    }

    fn entries(&self, value: &Value) -> Result<Vec<Value>> {
        match value.get(ROOTS_FIELD) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(entries)) => Ok(entries.clone()),
            Some(_) => Err(self.io_error(format!("'{}' is not an array", ROOTS_FIELD))),
        }
    }

    /// Relative entries are taken relative to the directory holding the
    /// config file, which is where the player runs from.
    fn base_dir(&self) -> Result<PathBuf> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        if parent.is_absolute() {
            return Ok(parent);
        }

        let cwd = std::env::current_dir().map_err(|e| self.io_error(e))?;
        Ok(cwd.join(parent))
    }

    fn resolve(&self, base: &Path, entry: &str) -> Result<NormalizedPath> {
        let resolved = path::normalize(entry, self.separator).and_then(|p| {
            if p.is_absolute() {
                Ok(p)
            } else {
                let joined = format!("{}/{}", base.to_string_lossy(), entry);
                path::normalize(&joined, self.separator)
            }
        });

        resolved.map_err(|e| self.io_error(format!("root entry '{}': {}", entry, e)))
    }
}

impl RootStore for JsonRootConfig {
    fn load(&self) -> Result<RootSet> {
        let value = self.read_value()?;
        let base = self.base_dir()?;

        let mut paths = Vec::new();
        for entry in self.entries(&value)? {
            match entry.as_str() {
                Some(s) => paths.push(self.resolve(&base, s)?),
                None => warn!("ignoring non-string root entry {}", entry),
            }
        }

        let roots = RootSet::from_paths(paths.iter(), self.separator)?;

        debug!(
            "loaded {} roots from '{}'",
            roots.len(),
            self.path.to_string_lossy()
        );

        Ok(roots)
    }

    /// Rewrites the root list to match `roots`. Entries still present keep
    /// their original spelling; the file is replaced atomically.
    fn save(&self, roots: &RootSet) -> Result<()> {
        let mut value = self.read_value()?;
        let base = self.base_dir()?;

        let mut kept: Vec<NormalizedPath> = Vec::new();
        let mut entries = Vec::new();

        for entry in self.entries(&value)? {
            let resolved = match entry.as_str() {
                Some(s) => self.resolve(&base, s).ok(),
                None => None,
            };

            match resolved {
                Some(root) => {
                    if roots.contains(&root) && !kept.contains(&root) {
                        kept.push(root);
                        entries.push(entry);
                    } else {
                        debug!("dropping root entry {}", entry);
                    }
                }
                None => entries.push(entry),
            }
        }

        for root in roots {
            if !kept.contains(root) {
                debug!("adding root entry '{}'", root.trimmed());
                entries.push(Value::String(root.trimmed().to_string()));
            }
        }

        if let Some(object) = value.as_object_mut() {
            object.insert(ROOTS_FIELD.to_string(), Value::Array(entries));
        }

        let text = serde_json::to_vec_pretty(&value).map_err(|e| self.io_error(e))?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| self.io_error(e))?;
        tmp.write_all(&text).map_err(|e| self.io_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_error(e.error))?;

        info!("saved {} roots to '{}'", roots.len(), self.path.to_string_lossy());

        Ok(())
    }
}
