//! Build targets and the source-to-target lookup.
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// A compilation unit: a module name, its directory, its sources and the
/// compiler arguments sourcekite needs to type-check them.
///
/// Source paths are absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub path: PathBuf,
    pub sources: BTreeSet<PathBuf>,
    pub compiler_arguments: Vec<String>,
}

impl Target {
    /// A target covering just `source`, used when no discovered target owns it.
    pub fn single_file(source: &Path) -> Self {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            path: source.to_path_buf(),
            sources: BTreeSet::from([source.to_path_buf()]),
            compiler_arguments: Vec::new(),
        }
    }

    pub fn contains(&self, source: &Path) -> bool {
        self.sources.contains(source)
    }
}

/// Concatenate target lists, removing from each later target any source
/// already claimed by an earlier one.
pub fn flatten_unique<I>(groups: I) -> Vec<Target>
where
    I: IntoIterator<Item = Vec<Target>>,
{
    let mut claimed: BTreeSet<PathBuf> = BTreeSet::new();
    let mut flattened = Vec::new();

    for group in groups {
        // Sources are compared against earlier groups only, so two targets of
        // the same group may share a file.
        let mut group_sources = Vec::new();
        for mut target in group {
            target.sources.retain(|s| !claimed.contains(s));
            group_sources.extend(target.sources.iter().cloned());
            flattened.push(target);
        }
        claimed.extend(group_sources);
    }

    flattened
}

/// Every known target of the workspace.
#[derive(Debug, Clone, Default)]
pub struct TargetIndex {
    targets: Vec<Target>,
}

impl TargetIndex {
    pub fn new(targets: Vec<Target>) -> Self {
        Self { targets }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// The first target owning `source`, or a single-file target.
    pub fn target_for_source(&self, source: &Path) -> Target {
        self.find(source)
            .cloned()
            .unwrap_or_else(|| Target::single_file(source))
    }

    fn find(&self, source: &Path) -> Option<&Target> {
        self.targets.iter().find(|t| t.contains(source))
    }

    /// Register a newly created file with the target whose directory holds it.
    ///
    /// Returns the name of the target it was added to.
    pub fn source_created(&mut self, source: &Path) -> Option<String> {
        if let Some(owner) = self.find(source) {
            return Some(owner.name.clone());
        }
        let owner = self
            .targets
            .iter_mut()
            .filter(|t| source.starts_with(&t.path))
            .max_by_key(|t| t.path.components().count())?;
        owner.sources.insert(source.to_path_buf());
        tracing::debug!("added {} to target {}", source.display(), owner.name);
        Some(owner.name.clone())
    }

    /// Forget a deleted file. Returns true if any target owned it.
    pub fn source_deleted(&mut self, source: &Path) -> bool {
        let mut removed = false;
        for target in &mut self.targets {
            removed |= target.sources.remove(source);
        }
        removed
    }
}
