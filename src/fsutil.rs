use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

/// Error that occurs when a file cannot be opened or replaced.
#[derive(Debug, thiserror::Error)]
#[error("failed to access file `{path}`: {source}")]
pub struct FileError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileError`] if the file cannot be opened.
///
/// # Example
/// ```no_run
/// # use pingforest::fsutil;
/// let reader = fsutil::open_file_reader("/some/file.json")?;
/// # Ok::<(), fsutil::FileError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Replaces the contents of `path` with `contents`.
///
/// The data is written to a sibling `<name>.tmp` file first and then renamed
/// over `path`, so readers see either the old or the new contents.
///
/// # Errors
///
/// Returns a [`FileError`] naming the file that could not be written or
/// renamed.
pub fn write_atomic(path: impl AsRef<Path>, contents: &[u8]) -> Result<(), FileError> {
    let path = path.as_ref();
    let tmp_path = sibling_tmp_path(path);

    let write = || -> io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()
    };
    write().map_err(|source| FileError {
        path: tmp_path.clone(),
        source,
    })?;

    std::fs::rename(&tmp_path, path).map_err(|source| FileError {
        path: path.to_path_buf(),
        source,
    })
}

fn sibling_tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("tree"));
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_open_file_reader_success() {
        let tmp = tempfile::NamedTempFile::new().expect("failed to create temp file");
        let path = tmp.path();
        let reader = open_file_reader(path).expect("should open test file");
        let metadata = reader.get_ref().metadata().unwrap();
        assert!(metadata.is_file());
    }

    #[test]
    fn test_open_file_reader_error() {
        let result = open_file_reader("/definitely/does/not/exist");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.path, PathBuf::from("/definitely/does/not/exist"));
        assert_eq!(err.source.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree_data.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert!(!dir.path().join("tree_data.json.tmp").exists());
    }

    #[test]
    fn test_write_atomic_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("tree_data.json");

        let err = write_atomic(&path, b"data").unwrap_err();
        assert_eq!(err.path, dir.path().join("missing").join("tree_data.json.tmp"));
        assert_eq!(err.source.kind(), std::io::ErrorKind::NotFound);
    }
}
