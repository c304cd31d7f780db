//! Data files carried into the emitted IOC's `data/` directory.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Bytes produced on demand at flush time.
pub type DeferredContents = Box<dyn Fn() -> Vec<u8>>;

/// Where a data file's bytes come from.
pub enum DataSource {
    /// An existing file, copied at flush time.
    File(PathBuf),
    /// An in-memory buffer.
    Buffer(Vec<u8>),
    /// Contents produced by a closure invoked at flush time.
    Deferred(DeferredContents),
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSource::File(path) => f.debug_tuple("File").field(path).finish(),
            DataSource::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
            DataSource::Deferred(_) => f.debug_tuple("Deferred").finish(),
        }
    }
}

/// A file destined for `data/<logical path>` in the emitted tree.
#[derive(Debug)]
pub struct DataFile {
    /// Path relative to the IOC's data directory.
    pub logical_path: PathBuf,
    /// Source of the bytes.
    pub source: DataSource,
}

impl DataFile {
    /// Wrap an existing source file; the logical path is its file name.
    pub fn from_path(source: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let logical_path = source
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| source.clone());
        DataFile {
            logical_path,
            source: DataSource::File(source),
        }
    }

    /// A buffered stream flushed to `logical_path`.
    pub fn from_bytes(logical_path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        DataFile {
            logical_path: logical_path.into(),
            source: DataSource::Buffer(bytes),
        }
    }

    /// A stream whose contents are produced when flushed.
    pub fn deferred(
        logical_path: impl Into<PathBuf>,
        contents: impl Fn() -> Vec<u8> + 'static,
    ) -> Self {
        DataFile {
            logical_path: logical_path.into(),
            source: DataSource::Deferred(Box::new(contents)),
        }
    }

    /// Whether two claims on the same logical path refer to the same bytes.
    ///
    /// Only two wrappers of the same source file are compatible; buffered
    /// and deferred streams always conflict.
    pub fn same_source(&self, other: &DataFile) -> bool {
        match (&self.source, &other.source) {
            (DataSource::File(a), DataSource::File(b)) => a == b,
            _ => false,
        }
    }

    /// Write the file under `data_dir`, creating parent directories.
    pub fn flush(&self, data_dir: &Path) -> Result<()> {
        let destination = data_dir.join(&self.logical_path);
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match &self.source {
            DataSource::File(source) => {
                std::fs::copy(source, &destination)?;
            }
            DataSource::Buffer(bytes) => {
                std::fs::write(&destination, bytes)?;
            }
            DataSource::Deferred(contents) => {
                std::fs::write(&destination, contents())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_file_is_copied() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("lookup.tab");
        std::fs::write(&source, "0 1 2\n").unwrap();
        let data_dir = dir.path().join("data");

        let file = DataFile::from_path(&source);
        assert_eq!(file.logical_path, PathBuf::from("lookup.tab"));
        file.flush(&data_dir).unwrap();
        assert_eq!(
            std::fs::read_to_string(data_dir.join("lookup.tab")).unwrap(),
            "0 1 2\n"
        );
    }

    #[test]
    fn deferred_contents_invoked_at_flush() {
        let dir = tempfile::tempdir().unwrap();
        let file = DataFile::deferred("gen/table.dat", || b"generated".to_vec());
        file.flush(dir.path()).unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("gen/table.dat")).unwrap(),
            b"generated"
        );
    }

    #[test]
    fn source_compatibility() {
        let a = DataFile::from_path("/tmp/x.tab");
        let b = DataFile::from_path("/tmp/x.tab");
        let c = DataFile::from_path("/tmp/y.tab");
        let d = DataFile::from_bytes("x.tab", vec![]);
        assert!(a.same_source(&b));
        assert!(!a.same_source(&c));
        assert!(!a.same_source(&d));
    }
}
