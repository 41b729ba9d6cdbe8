use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum Separator {
    Slash,
    Backslash,
}

impl Separator {
    pub fn as_char(self) -> char {
        match self {
            Separator::Slash => '/',
            Separator::Backslash => '\\',
        }
    }

    pub fn from_char(c: char) -> Option<Separator> {
        match c {
            '/' => Some(Separator::Slash),
            '\\' => Some(Separator::Backslash),
            _ => None,
        }
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

fn is_drive(segment: &str) -> bool {
    segment.len() == 2 && segment.ends_with(':') && segment.starts_with(|c: char| c.is_ascii_alphabetic())
}

/// A folder path in the index's own spelling: one separator convention,
/// exactly one trailing separator, case kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NormalizedPath(String);

/// Rewrites `raw` into the `sep` convention.
///
/// Either separator is accepted on input, mixed freely. A leading single
/// separator (posix root) or double separator (UNC share) is kept, `.` and
/// `..` are resolved lexically, and trailing separators collapse into one.
/// `..` never climbs above a leading separator or drive; it stops there.
/// Empty input and empty interior segments (`a//b`) are rejected.
pub fn normalize(raw: &str, sep: Separator) -> Result<NormalizedPath> {
    if raw.is_empty() {
        return Err(Error::InvalidPath(raw.to_string()));
    }

    let body = raw.trim_end_matches(is_separator);
    let leading = body.chars().take_while(|&c| is_separator(c)).count();

    if body.is_empty() {
        // nothing but separators
        return Ok(NormalizedPath(sep.as_char().to_string()));
    }

    if leading > 2 {
        return Err(Error::InvalidPath(raw.to_string()));
    }

    let mut segments: Vec<&str> = Vec::new();

    for segment in body[leading..].split(is_separator) {
        match segment {
            "" => return Err(Error::InvalidPath(raw.to_string())),
            "." => {}
            ".." => {
                let floor = if leading == 0 && segments.first().map_or(false, |s| is_drive(s)) {
                    1
                } else {
                    0
                };

                if segments.len() > floor {
                    segments.pop();
                } else if leading == 0 && floor == 0 {
                    return Err(Error::InvalidPath(raw.to_string()));
                }
            }
            s => segments.push(s),
        }
    }

    let sep = sep.as_char();
    let mut result: String = std::iter::repeat(sep).take(leading).collect();

    if segments.is_empty() {
        if leading == 0 {
            return Err(Error::InvalidPath(raw.to_string()));
        }
        result.truncate(sep.len_utf8());
        return Ok(NormalizedPath(result));
    }

    for segment in segments {
        result.push_str(segment);
        result.push(sep);
    }

    Ok(NormalizedPath(result))
}

impl NormalizedPath {
    /// Accepts a path as stored in the index without rewriting it.
    pub fn parse(stored: &str) -> Result<NormalizedPath> {
        match stored.chars().last() {
            Some(c) if is_separator(c) => Ok(NormalizedPath(stored.to_string())),
            _ => Err(Error::InvalidPath(stored.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn separator(&self) -> Separator {
        match self.0.chars().last().and_then(Separator::from_char) {
            Some(sep) => sep,
            None => Separator::Slash,
        }
    }

    /// The path without its trailing separator.
    pub fn trimmed(&self) -> &str {
        let sep = self.separator().as_char();
        &self.0[..self.0.len() - sep.len_utf8()]
    }

    /// A lone separator: the top of a root-relative tree.
    pub fn is_bare(&self) -> bool {
        self.trimmed().is_empty()
    }

    pub fn is_absolute(&self) -> bool {
        if self.0.starts_with(is_separator) {
            return true;
        }

        is_drive(self.0.split(is_separator).next().unwrap_or(""))
    }

    pub fn file_name(&self) -> &str {
        let trimmed = self.trimmed();
        match trimmed.rfind(is_separator) {
            Some(pos) => &trimmed[pos + 1..],
            None => trimmed,
        }
    }

    /// The containing directory. A single relative segment yields the bare
    /// separator; a drive root or the bare separator has no parent.
    pub fn parent(&self) -> Option<NormalizedPath> {
        let sep = self.separator().as_char();
        let trimmed = self.trimmed();

        if trimmed.is_empty() || trimmed.trim_start_matches(is_separator).is_empty() {
            return None;
        }

        match trimmed.rfind(is_separator) {
            Some(pos) => {
                let head = &trimmed[..pos];
                if head.trim_start_matches(is_separator).is_empty() {
                    return Some(NormalizedPath(sep.to_string()));
                }
                let mut parent = head.to_string();
                parent.push(sep);
                Some(NormalizedPath(parent))
            }
            None => {
                if trimmed.ends_with(':') {
                    None
                } else {
                    Some(NormalizedPath(sep.to_string()))
                }
            }
        }
    }

    /// Segment-aware prefix test; a path starts with itself.
    pub fn starts_with(&self, prefix: &NormalizedPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn is_descendant_of(&self, ancestor: &NormalizedPath) -> bool {
        self.0.len() > ancestor.0.len() && self.starts_with(ancestor)
    }

    /// The part of this path below `prefix`, without a trailing separator.
    pub fn strip_prefix(&self, prefix: &NormalizedPath) -> Option<&str> {
        if !self.starts_with(prefix) {
            return None;
        }
        let rest = &self.0[prefix.0.len()..];
        Some(rest.trim_end_matches(is_separator))
    }

    /// Moves this path from under `src` to under `dst`, converting the
    /// carried-over segments to `dst`'s separator.
    pub fn graft(&self, src: &NormalizedPath, dst: &NormalizedPath) -> Result<NormalizedPath> {
        let rest = match self.strip_prefix(src) {
            Some(rest) => rest,
            None => {
                return Err(Error::InvalidPath(format!(
                    "{} is not under {}",
                    self.0, src.0
                )))
            }
        };

        if rest.is_empty() {
            return Ok(dst.clone());
        }

        let sep = dst.separator().as_char();
        let mut result = dst.0.clone();
        for c in rest.chars() {
            result.push(if is_separator(c) { sep } else { c });
        }
        result.push(sep);

        Ok(NormalizedPath(result))
    }

    pub fn with_separator(&self, sep: Separator) -> NormalizedPath {
        let sep = sep.as_char();
        NormalizedPath(
            self.0
                .chars()
                .map(|c| if is_separator(c) { sep } else { c })
                .collect(),
        )
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
