//! File-based channel source.

use crate::error::StorageResult;
use crate::source::ChannelSource;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

/// A channel source reading an smd file.
///
/// # End of data
///
/// - A *complete* file (see [`FileSource::open`]) ends at the first EOF.
/// - A *live* file (see [`FileSource::open_live`]) may still be written by
///   the acquisition; EOF is reported as a stall and the caller decides how
///   long to wait.
///
/// # Example
///
/// ```no_run
/// use smdflow_storage::{ChannelSource, FileSource};
/// use std::path::Path;
///
/// let mut source = FileSource::open(Path::new("run0001-s000.smd.xtc2")).unwrap();
/// let mut buf = vec![0u8; 4096];
/// let n = source.read(&mut buf).unwrap();
/// ```
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: File,
    position: u64,
    live: bool,
    ended: bool,
}

impl FileSource {
    /// Opens a complete file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_inner(path, false)
    }

    /// Opens a file that may still be growing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open_live(path: &Path) -> StorageResult<Self> {
        Self::open_inner(path, true)
    }

    fn open_inner(path: &Path, live: bool) -> StorageResult<Self> {
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            position: 0,
            live,
            ended: false,
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChannelSource for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> StorageResult<usize> {
        if self.ended || buf.is_empty() {
            return Ok(0);
        }

        let n = loop {
            match self.file.read(buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };

        if n == 0 && !self.live {
            self.ended = true;
        }
        self.position += n as u64;
        Ok(n)
    }

    fn is_ended(&self) -> bool {
        self.ended
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn file_reads_until_eof() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c0.smd");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut source = FileSource::open(&path).unwrap();
        let mut buf = [0u8; 6];
        assert_eq!(source.read(&mut buf).unwrap(), 6);
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert!(!source.is_ended());
        assert_eq!(source.read(&mut buf).unwrap(), 0);
        assert!(source.is_ended());
        assert_eq!(source.position(), 10);
    }

    #[test]
    fn file_live_never_ends_on_eof() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("live.smd");
        let mut writer = std::fs::File::create(&path).unwrap();
        writer.write_all(b"abc").unwrap();
        writer.flush().unwrap();

        let mut source = FileSource::open_live(&path).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(source.read(&mut buf).unwrap(), 3);
        assert_eq!(source.read(&mut buf).unwrap(), 0);
        assert!(!source.is_ended());

        writer.write_all(b"de").unwrap();
        writer.flush().unwrap();
        assert_eq!(source.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"de");
    }

    #[test]
    fn file_missing_fails() {
        let dir = tempdir().unwrap();
        assert!(FileSource::open(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn file_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.smd");
        std::fs::write(&path, b"").unwrap();
        let source = FileSource::open(&path).unwrap();
        assert_eq!(source.path(), path);
    }
}
