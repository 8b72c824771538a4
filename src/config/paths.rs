use serde::Deserialize;
use std::{collections::HashSet, path::Path};
use thiserror::Error;
use tokio::fs;

use crate::net::PathSpec;

// -----------------------------------------------------------------------------
// ----- PathsFile -------------------------------------------------------------

/// Optional TOML file naming the paths (uplinks or relay endpoints) a client
/// spreads traffic over:
///
/// ```toml
/// [[paths]]
/// name = "wan1"
/// address = "203.0.113.7:12345"
/// ```
#[derive(Debug, Clone, Default)]
pub struct PathsFile {
    pub paths: Vec<PathSpec>,
}

// -----------------------------------------------------------------------------
// ----- PathsFile: Static -----------------------------------------------------

impl PathsFile {
    pub async fn load(path: &Path) -> Result<PathsFile, PathsError> {
        let raw = fs::read_to_string(path).await.map_err(|e| PathsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<PathsFile, PathsError> {
        let doc: OnDisk = toml::from_str(raw).map_err(|e| PathsError::Toml { source: e })?;

        let mut seen = HashSet::with_capacity(doc.paths.len());
        let mut paths = Vec::with_capacity(doc.paths.len());

        for entry in doc.paths {
            if entry.address.trim().is_empty() {
                return Err(PathsError::InvalidField("address".into()));
            }
            if !seen.insert(entry.name.clone()) {
                return Err(PathsError::DuplicatePath { name: entry.name });
            }
            paths.push(PathSpec::new(entry.name, entry.address.trim()));
        }

        Ok(PathsFile { paths })
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct OnDisk {
    #[serde(default)]
    paths: Vec<OnDiskPath>,
}

#[derive(Debug, Clone, Deserialize)]
struct OnDiskPath {
    #[serde(alias = "label")]
    name: String,
    address: String,
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PathsError {
    #[error("duplicate [[paths]] entry '{name}'")]
    DuplicatePath { name: String },

    #[error("invalid or missing field '{0}'")]
    InvalidField(String),

    #[error("read error for {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("toml parse error: {source}")]
    Toml { source: toml::de::Error },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_tmp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn loads_named_paths_in_order() {
        let tmp = write_tmp(
            r#"
            [[paths]]
            name = "wan1"
            address = "10.0.0.1:12345"

            [[paths]]
            label = "lte"
            address = " 192.168.8.1:12345 "
        "#,
        );

        let file = PathsFile::load(tmp.path()).await.unwrap();
        assert_eq!(
            file.paths,
            vec![
                PathSpec::new("wan1", "10.0.0.1:12345"),
                PathSpec::new("lte", "192.168.8.1:12345"),
            ]
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = PathsFile::parse(
            r#"
            [[paths]]
            name = "a"
            address = "x:1"
            [[paths]]
            name = "a"
            address = "y:2"
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, PathsError::DuplicatePath { name } if name == "a"));
    }

    #[test]
    fn empty_file_has_no_paths() {
        assert!(PathsFile::parse("").unwrap().paths.is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = PathsFile::load(Path::new("/nonexistent/pathrelay.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, PathsError::Io { .. }));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
