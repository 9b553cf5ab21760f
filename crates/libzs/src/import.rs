//! The import system.
//!
//! An import source string is either `scheme:rest` (alphabetic scheme,
//! dispatched to the importer registered under that scheme) or a filesystem
//! path resolved against the importing document's directory, the configured
//! search path and the working directory. Results are scope-like objects
//! cached per source; importing the same path twice returns the cached
//! result without re-compiling.
//!
//! Import systems chain: lookups that fail locally are retried on the
//! parent system (used for process-wide built-in modules like
//! `module:core`).

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::objects::Value;

/// The scope-like result of an import: names exposed to the importing
/// document.
#[derive(Debug, Clone, Default)]
pub struct ImportScope {
    names: IndexMap<String, Value>,
}

impl ImportScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.names.insert(name.into(), value);
    }

    pub fn get_name(&self, name: &str) -> Option<&Value> {
        self.names.get(name)
    }

    pub fn all(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.names.iter()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Importer kinds the dispatcher knows how to drive.
///
/// Dispatch is a static match rather than a trait-object table: the set of
/// importer behaviors is closed, while the *registrations* (which scheme or
/// suffix maps to which kind) stay data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImporterKind {
    /// Scheme importer backed by the registered module table
    Modules,
    /// Suffix importer that runs the toolchain over a source document
    Document,
}

/// Where an import source string was routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportRoute {
    Scheme { importer: ImporterKind, rest: String },
    File { importer: ImporterKind, path: PathBuf },
    Directory { path: PathBuf },
    NotFound,
}

#[derive(Debug)]
pub struct ImportSystem {
    /// Scheme name -> importer
    importers: IndexMap<String, ImporterKind>,
    /// File suffix (with dot) -> importer
    suffix_importers: IndexMap<String, ImporterKind>,
    /// Search path for relative sources
    path: Vec<PathBuf>,
    /// Pre-registered in-process modules, reachable via `module:<name>`
    modules: IndexMap<String, ImportScope>,
    /// Cache of finished imports keyed by the resolved source
    cache: IndexMap<String, ImportScope>,
    parent: Option<Box<ImportSystem>>,
}

impl ImportSystem {
    pub fn new() -> Self {
        let mut system = Self {
            importers: IndexMap::new(),
            suffix_importers: IndexMap::new(),
            path: Vec::new(),
            modules: IndexMap::new(),
            cache: IndexMap::new(),
            parent: None,
        };
        system.add_importer("module", ImporterKind::Modules);
        system.add_suffix_importer(".zs", ImporterKind::Document);
        system
    }

    pub fn with_parent(parent: ImportSystem) -> Self {
        let mut system = Self::new();
        system.parent = Some(Box::new(parent));
        system
    }

    pub fn add_importer(&mut self, scheme: impl Into<String>, importer: ImporterKind) {
        self.importers.insert(scheme.into(), importer);
    }

    pub fn add_suffix_importer(&mut self, suffix: impl Into<String>, importer: ImporterKind) {
        self.suffix_importers.insert(suffix.into(), importer);
    }

    pub fn add_directory(&mut self, path: impl Into<PathBuf>) {
        self.path.push(path.into());
    }

    /// Registers an in-process module under `module:<name>`.
    pub fn add_module(&mut self, name: impl Into<String>, scope: ImportScope) {
        self.modules.insert(name.into(), scope);
    }

    pub fn get_module(&self, name: &str) -> Option<&ImportScope> {
        self.modules
            .get(name)
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.get_module(name)))
    }

    pub fn cached(&self, source: &str) -> Option<&ImportScope> {
        self.cache
            .get(source)
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.cached(source)))
    }

    pub fn cache_result(&mut self, source: impl Into<String>, scope: ImportScope) {
        self.cache.insert(source.into(), scope);
    }

    /// Splits `scheme:rest` when the prefix is purely alphabetic.
    pub fn split_scheme(source: &str) -> Option<(&str, &str)> {
        let (scheme, rest) = source.split_once(':')?;
        if !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphabetic()) {
            Some((scheme, rest))
        } else {
            None
        }
    }

    /// Routes a source string to an importer without running it.
    ///
    /// `origin` is the directory of the importing document, tried first for
    /// relative paths.
    pub fn route(&self, source: &str, origin: Option<&Path>) -> ImportRoute {
        if let Some((scheme, rest)) = Self::split_scheme(source) {
            let importer = self
                .importers
                .get(scheme)
                .copied()
                .or_else(|| self.parent.as_ref().and_then(|parent| parent.importers.get(scheme).copied()));
            return match importer {
                Some(importer) => ImportRoute::Scheme { importer, rest: rest.to_string() },
                None => ImportRoute::NotFound,
            };
        }

        let path = match self.resolve(Path::new(source), origin) {
            Some(path) => path,
            None => return ImportRoute::NotFound,
        };

        if path.is_dir() {
            return ImportRoute::Directory { path };
        }

        let suffix = path
            .extension()
            .map(|extension| format!(".{}", extension.to_string_lossy()))
            .unwrap_or_default();
        let importer = self
            .suffix_importers
            .get(&suffix)
            .copied()
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.suffix_importers.get(&suffix).copied()));
        match importer {
            Some(importer) => ImportRoute::File { importer, path },
            None => ImportRoute::NotFound,
        }
    }

    /// Resolves a path against the origin directory, the search path and
    /// the working directory, in that order.
    pub fn resolve(&self, path: &Path, origin: Option<&Path>) -> Option<PathBuf> {
        if path.is_absolute() {
            return path.exists().then(|| path.to_path_buf());
        }
        if let Some(origin) = origin {
            let candidate = origin.join(path);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        for directory in self.path.iter() {
            let candidate = directory.join(path);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        let candidate = std::env::current_dir().ok()?.join(path);
        candidate.exists().then_some(candidate)
    }
}

impl Default for ImportSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_splitting() {
        assert_eq!(ImportSystem::split_scheme("module:core"), Some(("module", "core")));
        assert_eq!(ImportSystem::split_scheme("./path/file.zs"), None);
        assert_eq!(ImportSystem::split_scheme("c:rest"), Some(("c", "rest")));
        assert_eq!(ImportSystem::split_scheme("1x:rest"), None);
    }

    #[test]
    fn module_scheme_routes_to_modules_importer() {
        let system = ImportSystem::new();
        assert_eq!(
            system.route("module:core", None),
            ImportRoute::Scheme { importer: ImporterKind::Modules, rest: "core".to_string() }
        );
    }

    #[test]
    fn unknown_scheme_is_not_found() {
        let system = ImportSystem::new();
        assert_eq!(system.route("nope:core", None), ImportRoute::NotFound);
    }

    #[test]
    fn parent_modules_are_visible() {
        let mut parent = ImportSystem::new();
        let mut scope = ImportScope::new();
        scope.define("x", Value::Bool(true));
        parent.add_module("extra", scope);

        let system = ImportSystem::with_parent(parent);
        assert!(system.get_module("extra").is_some());
        assert!(system.get_module("missing").is_none());
    }

    #[test]
    fn import_cache_round_trip() {
        let mut system = ImportSystem::new();
        assert!(system.cached("module:core").is_none());
        system.cache_result("module:core", ImportScope::new());
        assert!(system.cached("module:core").is_some());
    }
}
