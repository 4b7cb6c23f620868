//! File transfer over `FileContents` frames.
//!
//! A transfer is a header frame (sequence 1) carrying the file name, then the
//! content fragments; the fragment with sequence 0 closes the file.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use roverlink_frame::{
    file_header, split, Frame, FrameIdAllocator, Purpose, FILE_HEADER_SEQUENCE, TERMINAL_SEQUENCE,
};
use tracing::{debug, info};

use crate::error::{LinkError, Result};

/// Writes incoming transfers into one directory.
#[derive(Debug)]
pub struct FileReceiver {
    dir: PathBuf,
    current: Option<(PathBuf, File)>,
}

impl FileReceiver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the transfer in progress, if any.
    pub fn in_progress(&self) -> Option<&Path> {
        self.current.as_ref().map(|(path, _)| path.as_path())
    }

    /// Handle one `FileContents` frame. Returns the path once a file is complete.
    pub fn receive(&mut self, frame: &Frame) -> Result<Option<PathBuf>> {
        match frame.sequence {
            FILE_HEADER_SEQUENCE => {
                let name = String::from_utf8_lossy(&frame.payload);
                let base = Path::new(name.as_ref())
                    .file_name()
                    .ok_or_else(|| LinkError::Protocol(format!("invalid file name {name:?}")))?;
                std::fs::create_dir_all(&self.dir)?;
                let path = self.dir.join(base);
                let file = File::create(&path)?;
                if let Some((previous, _)) = self.current.replace((path.clone(), file)) {
                    debug!(path = %previous.display(), "unfinished transfer replaced");
                }
                info!(path = %path.display(), "receiving file");
                Ok(None)
            }
            TERMINAL_SEQUENCE => {
                let (path, mut file) = self.current.take().ok_or_else(orphan_chunk)?;
                file.write_all(&frame.payload)?;
                file.flush()?;
                info!(path = %path.display(), "file received");
                Ok(Some(path))
            }
            _ => {
                let (_, file) = self.current.as_mut().ok_or_else(orphan_chunk)?;
                file.write_all(&frame.payload)?;
                Ok(None)
            }
        }
    }
}

fn orphan_chunk() -> LinkError {
    LinkError::Protocol("file chunk without an open transfer".to_string())
}

/// Serves local files for `RequestFile` frames.
///
/// Relative names resolve against `root`; absolute paths are used as given.
#[derive(Debug, Clone)]
pub struct FileProvider {
    root: PathBuf,
}

impl FileProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn read(&self, name: &str) -> Result<Bytes> {
        let path = self.root.join(name);
        Ok(Bytes::from(std::fs::read(path)?))
    }
}

/// Header frame plus content fragments for `contents` sent under `name`.
pub fn transfer_frames(name: &str, contents: Bytes, ids: &FrameIdAllocator) -> Result<Vec<Frame>> {
    let mut frames = vec![file_header(name, ids)];
    frames.extend(split(
        contents,
        Purpose::FileContents,
        FILE_HEADER_SEQUENCE,
        ids,
    )?);
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use roverlink_frame::split_with_chunk;

    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "roverlink-files-{tag}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn hello_world_transfer() {
        let dir = temp_dir("hello");
        let ids = FrameIdAllocator::new();
        let frames = transfer_frames("notes/hello.txt", Bytes::from_static(b"hello world"), &ids)
            .unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].sequence, FILE_HEADER_SEQUENCE);
        assert_eq!(frames[1].sequence, TERMINAL_SEQUENCE);

        let mut receiver = FileReceiver::new(&dir);
        assert_eq!(receiver.receive(&frames[0]).unwrap(), None);
        assert_eq!(receiver.in_progress(), Some(dir.join("hello.txt").as_path()));
        let done = receiver.receive(&frames[1]).unwrap();

        assert_eq!(done, Some(dir.join("hello.txt")));
        assert_eq!(std::fs::read(dir.join("hello.txt")).unwrap(), b"hello world");
        assert!(receiver.in_progress().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn multi_chunk_transfer_appends_in_order() {
        let dir = temp_dir("chunks");
        let ids = FrameIdAllocator::new();
        let contents: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut frames = vec![file_header("data.bin", &ids)];
        frames.extend(
            split_with_chunk(contents.clone(), Purpose::FileContents, 1, 64, &ids).unwrap(),
        );

        let mut receiver = FileReceiver::new(&dir);
        let completed: Vec<PathBuf> = frames
            .iter()
            .filter_map(|f| receiver.receive(f).unwrap())
            .collect();

        assert_eq!(completed, vec![dir.join("data.bin")]);
        assert_eq!(std::fs::read(dir.join("data.bin")).unwrap(), contents);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn header_truncates_existing_file() {
        let dir = temp_dir("truncate");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.txt"), b"old contents that are long").unwrap();

        let ids = FrameIdAllocator::new();
        let mut receiver = FileReceiver::new(&dir);
        for frame in transfer_frames("a.txt", Bytes::from_static(b"new"), &ids).unwrap() {
            receiver.receive(&frame).unwrap();
        }
        assert_eq!(std::fs::read(dir.join("a.txt")).unwrap(), b"new");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn orphan_chunk_is_rejected() {
        let mut receiver = FileReceiver::new(temp_dir("orphan"));
        let chunk = Frame::new(1, Purpose::FileContents, &b"data"[..]).with_sequence(7);
        let last = Frame::new(2, Purpose::FileContents, &b"end"[..]);

        assert!(matches!(receiver.receive(&chunk), Err(LinkError::Protocol(_))));
        assert!(matches!(receiver.receive(&last), Err(LinkError::Protocol(_))));
    }

    #[test]
    fn header_with_path_components_uses_base_name() {
        let dir = temp_dir("basename");
        let mut receiver = FileReceiver::new(&dir);
        let header = Frame::new(1, Purpose::FileContents, &b"../../etc/passwd"[..])
            .with_sequence(FILE_HEADER_SEQUENCE);

        receiver.receive(&header).unwrap();
        assert_eq!(receiver.in_progress(), Some(dir.join("passwd").as_path()));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn header_without_file_name_is_rejected() {
        let mut receiver = FileReceiver::new(temp_dir("noname"));
        let header =
            Frame::new(1, Purpose::FileContents, &b".."[..]).with_sequence(FILE_HEADER_SEQUENCE);
        assert!(matches!(receiver.receive(&header), Err(LinkError::Protocol(_))));
    }

    #[test]
    fn provider_reads_relative_to_root() {
        let dir = temp_dir("provider");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("log.csv"), b"a,b").unwrap();

        let provider = FileProvider::new(&dir);
        assert_eq!(provider.read("log.csv").unwrap().as_ref(), b"a,b");
        assert!(matches!(provider.read("missing.csv"), Err(LinkError::Io(_))));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
