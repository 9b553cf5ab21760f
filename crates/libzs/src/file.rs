//! Source file representation and document identity for the Z# compiler.
//!
//! A [`SourceFile`] couples a document path with its source text behind
//! cheap-to-clone shared pointers; every span, token and diagnostic in the
//! compiler refers back to one. [`DocumentInfo`] is the key the toolchain and
//! import system use to identify one document.

use std::{path::{Path, PathBuf}, sync::Arc};

use miette::NamedSource;

/// A source document with its path and code content.
///
/// Cloning is cheap; all clones share the same underlying text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceFile {
    /// The file path as a vector of path components
    pub path: Arc<Vec<String>>,
    /// The source code content of the file
    pub code: Arc<String>,
}

impl SourceFile {
    pub fn new(path: Vec<String>, code: String) -> Self {
        Self {
            path: path.into(),
            code: code.into(),
        }
    }

    /// Returns a reference to the file path components
    pub fn path(&self) -> &Vec<String> {
        &self.path
    }

    /// Returns a reference to the source code content
    pub fn code(&self) -> &str {
        self.code.as_ref()
    }

    /// The path components joined into a single display name
    pub fn name(&self) -> String {
        let buffer = PathBuf::from_iter(self.path.iter());
        buffer.to_string_lossy().into_owned()
    }
}

impl std::fmt::Display for SourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SourceFile: {:?}", self.path)
    }
}

impl From<SourceFile> for NamedSource<String> {
    fn from(file: SourceFile) -> Self {
        NamedSource::new(file.name(), file.code.to_string())
    }
}

impl From<&SourceFile> for NamedSource<String> {
    fn from(file: &SourceFile) -> Self {
        NamedSource::new(file.name(), file.code.to_string())
    }
}

/// Identity of a document inside one compilation: the normalized path string
/// used as the cache key by the toolchain and the import system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentInfo {
    path: PathBuf,
}

impl DocumentInfo {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The normalized string form used as a cache key.
    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// The directory containing this document, if any.
    pub fn directory(&self) -> Option<&Path> {
        self.path.parent()
    }

    /// Module-style name: file stem without extension.
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path_string())
    }
}

impl std::fmt::Display for DocumentInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_file_name_joins_components() {
        let file = SourceFile::new(vec!["sub".into(), "lib".into()], "module lib;".to_string());
        assert_eq!(file.name(), "sub/lib");
        assert_eq!(file.code(), "module lib;");
    }

    #[test]
    fn document_info_name_strips_extension() {
        let info = DocumentInfo::from_path("projects/demo/main.zs");
        assert_eq!(info.name(), "main");
        assert_eq!(info.path_string(), "projects/demo/main.zs");
    }
}
