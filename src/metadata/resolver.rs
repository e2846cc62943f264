//! Locating the assemblies an assembly refers to.
//!
//! Resolution is only needed to judge the visibility of custom attribute constructors
//! declared in other assemblies. An unresolvable reference is never an error; callers treat
//! its members as invisible.

use std::{path::PathBuf, sync::Arc};

use dashmap::DashMap;

use crate::metadata::{
    assembly::Assembly,
    image::{AssemblyReader, PeImage},
    references::AssemblyRef,
};

/// File extensions tried in each search directory, in order
const SEARCH_EXTENSIONS: [&str; 2] = ["dll", "exe"];

/// Finds the assembly an [`AssemblyRef`] points at
pub trait AssemblyResolver: Send + Sync {
    /// Returns the referenced assembly, or `None` if it cannot be found
    fn resolve(&self, reference: &AssemblyRef) -> Option<Arc<Assembly>>;
}

/// A resolver that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResolver;

impl AssemblyResolver for NullResolver {
    fn resolve(&self, _reference: &AssemblyRef) -> Option<Arc<Assembly>> {
        None
    }
}

/// Thread-safe, name-keyed assembly cache.
///
/// Lookups first consult the assemblies already in the cache, then search the configured
/// directories for `<name>.dll` and `<name>.exe`. Both hits and misses are remembered, so
/// every name is searched for at most once. Names compare case-insensitively; versions are not
/// compared.
///
/// # Examples
///
/// ```rust,no_run
/// use dotstub::{AssemblyCache, PeImage};
///
/// let cache = AssemblyCache::new(PeImage).with_search_dir("/usr/lib/mono/4.5");
/// ```
pub struct AssemblyCache<R = PeImage> {
    entries: DashMap<String, Option<Arc<Assembly>>>,
    search_dirs: Vec<PathBuf>,
    reader: R,
}

impl Default for AssemblyCache<PeImage> {
    fn default() -> Self {
        AssemblyCache::new(PeImage)
    }
}

impl<R: AssemblyReader> AssemblyCache<R> {
    /// Create an empty cache that loads the files it finds with `reader`
    pub fn new(reader: R) -> Self {
        AssemblyCache {
            entries: DashMap::new(),
            search_dirs: Vec::new(),
            reader,
        }
    }

    /// Add a directory to search
    #[must_use]
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.push(dir.into());
        self
    }

    /// Add an assembly to the cache
    #[must_use]
    pub fn with_assembly(self, assembly: Assembly) -> Self {
        self.insert(assembly);
        self
    }

    /// Add an assembly to the cache, replacing any earlier entry of the same name
    pub fn insert(&self, assembly: Assembly) {
        self.entries
            .insert(assembly.name.to_ascii_lowercase(), Some(Arc::new(assembly)));
    }

    /// Number of cached names, misses included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was cached yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn search(&self, name: &str) -> Option<Arc<Assembly>> {
        for dir in &self.search_dirs {
            for extension in SEARCH_EXTENSIONS {
                let candidate = dir.join(format!("{name}.{extension}"));
                if !candidate.is_file() {
                    continue;
                }

                match self.reader.read_file(&candidate) {
                    Ok(assembly) => {
                        log::debug!("Resolved {} from {}", name, candidate.display());
                        return Some(Arc::new(assembly));
                    }
                    Err(error) => {
                        log::debug!("Skipping {}: {}", candidate.display(), error);
                    }
                }
            }
        }

        None
    }
}

impl<R: AssemblyReader> AssemblyResolver for AssemblyCache<R> {
    fn resolve(&self, reference: &AssemblyRef) -> Option<Arc<Assembly>> {
        let key = reference.name.to_ascii_lowercase();
        if let Some(entry) = self.entries.get(&key) {
            return entry.value().clone();
        }

        // No shard lock may be held while reading from disk
        let resolved = self.search(&reference.name);
        if resolved.is_none() {
            log::trace!("Unable to resolve {}", reference.assembly_name());
        }

        self.entries
            .entry(key)
            .or_insert(resolved)
            .value()
            .clone()
    }
}
