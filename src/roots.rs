use crate::error::{Error, Result};
use crate::path::{self, NormalizedPath, Separator};

/// The player's library roots, in configuration order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RootSet {
    roots: Vec<NormalizedPath>,
}

impl RootSet {
    pub fn new() -> RootSet {
        RootSet { roots: Vec::new() }
    }

    /// Normalizes each entry into `sep`. Entries must be absolute.
    pub fn from_paths<I, S>(paths: I, sep: Separator) -> Result<RootSet>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut roots = Vec::new();

        for raw in paths {
            let root = path::normalize(raw.as_ref(), sep)?;
            if !root.is_absolute() {
                return Err(Error::InvalidPath(root.to_string()));
            }
            roots.push(root);
        }

        Ok(RootSet { roots })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NormalizedPath> {
        self.roots.iter()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn contains(&self, root: &NormalizedPath) -> bool {
        self.roots.iter().any(|r| r == root)
    }

    pub fn push(&mut self, root: NormalizedPath) -> Result<()> {
        if !root.is_absolute() {
            return Err(Error::InvalidPath(root.to_string()));
        }
        if self.contains(&root) {
            return Err(Error::AlreadyExists(root.to_string()));
        }
        self.roots.push(root);
        Ok(())
    }

    pub fn remove(&mut self, root: &NormalizedPath) -> Result<()> {
        match self.roots.iter().position(|r| r == root) {
            Some(pos) => {
                self.roots.remove(pos);
                Ok(())
            }
            None => Err(Error::NotFound(root.to_string())),
        }
    }

    /// The longest root that prefixes `path`. Two equally long matches are
    /// the same root listed twice and cannot be told apart.
    pub fn longest_match(&self, path: &NormalizedPath) -> Result<Option<&NormalizedPath>> {
        let mut best: Option<&NormalizedPath> = None;
        let mut tied = false;

        for root in self.roots.iter().filter(|r| path.starts_with(r)) {
            match best {
                Some(b) if b.as_str().len() > root.as_str().len() => {}
                Some(b) if b.as_str().len() == root.as_str().len() => tied = true,
                _ => {
                    best = Some(root);
                    tied = false;
                }
            }
        }

        if tied {
            if let Some(root) = best {
                return Err(Error::AmbiguousRoot {
                    path: path.to_string(),
                    root: root.to_string(),
                });
            }
        }

        Ok(best)
    }
}

impl<'a> IntoIterator for &'a RootSet {
    type Item = &'a NormalizedPath;
    type IntoIter = std::slice::Iter<'a, NormalizedPath>;

    fn into_iter(self) -> Self::IntoIter {
        self.roots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> NormalizedPath {
        NormalizedPath::parse(s).unwrap()
    }

    #[test]
    fn longest_prefix_wins() {
        let roots = RootSet::from_paths(&["C:/bms", "C:/bms/songs", "D:/more_bms"], Separator::Slash).unwrap();

        assert_eq!(roots.longest_match(&p("C:/bms/songs/Foo/")).unwrap(), Some(&p("C:/bms/songs/")));
        assert_eq!(roots.longest_match(&p("C:/bms/other/")).unwrap(), Some(&p("C:/bms/")));
        assert_eq!(roots.longest_match(&p("C:/bmsx/")).unwrap(), None);
        assert_eq!(roots.longest_match(&p("songs/Foo/")).unwrap(), None);
    }

    #[test]
    fn duplicate_roots_are_ambiguous() {
        let roots = RootSet::from_paths(&["C:/bms/", "C:\\bms"], Separator::Slash).unwrap();

        match roots.longest_match(&p("C:/bms/songs/")) {
            Err(Error::AmbiguousRoot { .. }) => {}
            other => panic!("expected AmbiguousRoot, got {:?}", other),
        }
    }

    #[test]
    fn rejects_relative_roots() {
        assert!(RootSet::from_paths(&["songs"], Separator::Slash).is_err());
    }

    #[test]
    fn push_and_remove() {
        let mut roots = RootSet::new();
        roots.push(p("D:/more_bms/")).unwrap();

        match roots.push(p("D:/more_bms/")) {
            Err(Error::AlreadyExists(_)) => {}
            other => panic!("expected AlreadyExists, got {:?}", other),
        }

        roots.remove(&p("D:/more_bms/")).unwrap();
        assert!(roots.is_empty());
        assert!(roots.remove(&p("D:/more_bms/")).is_err());
    }
}
