//! Image capture on the rover and image storage on the station.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI8, Ordering};

use bytes::Bytes;
use roverlink_frame::StreamKind;
use tracing::{debug, info};

use crate::error::{LinkError, Result};

/// Where reassembled images end up on the station.
pub trait ImageSink: Send {
    fn store(&mut self, kind: StreamKind, image: Bytes) -> Result<()>;
}

/// Logs image sizes and discards the data.
#[derive(Debug, Default)]
pub struct LogImageSink;

impl ImageSink for LogImageSink {
    fn store(&mut self, kind: StreamKind, image: Bytes) -> Result<()> {
        info!(kind = kind.name(), bytes = image.len(), "image received");
        Ok(())
    }
}

/// Writes each image to `<root>/<kind>/<kind>_<n>.jpg`, numbering from 0.
#[derive(Debug)]
pub struct DirectoryImageSink {
    root: PathBuf,
    counters: [u64; 3],
}

impl DirectoryImageSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            counters: [0; 3],
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn next_index(&mut self, kind: StreamKind) -> u64 {
        let slot = StreamKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_default();
        let index = self.counters[slot];
        self.counters[slot] += 1;
        index
    }
}

impl ImageSink for DirectoryImageSink {
    fn store(&mut self, kind: StreamKind, image: Bytes) -> Result<()> {
        let dir = self.root.join(kind.name());
        std::fs::create_dir_all(&dir)?;
        let index = self.next_index(kind);
        let path = dir.join(format!("{}_{index}.jpg", kind.name()));
        std::fs::write(&path, &image)?;
        info!(path = %path.display(), bytes = image.len(), "image stored");
        Ok(())
    }
}

/// Produces images on the rover.
pub trait CameraSource: Send + Sync {
    /// Capture one encoded image for `kind`.
    fn capture(&self, kind: StreamKind) -> Result<Bytes>;

    /// Switch the live video feed to camera `index`.
    fn select_video(&self, index: i8) -> Result<()> {
        debug!(index, "camera selection ignored");
        Ok(())
    }
}

/// No camera attached: every capture fails.
#[derive(Debug, Default)]
pub struct NoCamera;

impl CameraSource for NoCamera {
    fn capture(&self, kind: StreamKind) -> Result<Bytes> {
        Err(LinkError::Capture(format!(
            "no camera attached for {}",
            kind.name()
        )))
    }
}

/// Serves a fixed image file for every capture, read fresh each time.
#[derive(Debug)]
pub struct StillCamera {
    path: PathBuf,
    selected: AtomicI8,
}

impl StillCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            selected: AtomicI8::new(0),
        }
    }

    /// Camera index chosen by the last video request.
    pub fn selected(&self) -> i8 {
        self.selected.load(Ordering::Relaxed)
    }
}

impl CameraSource for StillCamera {
    fn capture(&self, kind: StreamKind) -> Result<Bytes> {
        std::fs::read(&self.path).map(Bytes::from).map_err(|err| {
            LinkError::Capture(format!(
                "{} capture from {}: {err}",
                kind.name(),
                self.path.display()
            ))
        })
    }

    fn select_video(&self, index: i8) -> Result<()> {
        self.selected.store(index, Ordering::Relaxed);
        info!(index, "video camera selected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "roverlink-media-{tag}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn directory_sink_numbers_per_kind() {
        let dir = temp_dir("sink");
        let mut sink = DirectoryImageSink::new(&dir);

        sink.store(StreamKind::HighDefPhoto, Bytes::from_static(b"one")).unwrap();
        sink.store(StreamKind::HighDefPhoto, Bytes::from_static(b"two")).unwrap();
        sink.store(StreamKind::Video, Bytes::from_static(b"frame")).unwrap();

        assert_eq!(std::fs::read(dir.join("hdp/hdp_0.jpg")).unwrap(), b"one");
        assert_eq!(std::fs::read(dir.join("hdp/hdp_1.jpg")).unwrap(), b"two");
        assert_eq!(std::fs::read(dir.join("video/video_0.jpg")).unwrap(), b"frame");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn no_camera_fails() {
        let err = NoCamera.capture(StreamKind::LowDefPhoto).unwrap_err();
        assert!(matches!(err, LinkError::Capture(msg) if msg.contains("ldp")));
        assert!(NoCamera.select_video(2).is_ok());
    }

    #[test]
    fn still_camera_reads_file() {
        let dir = temp_dir("still");
        let path = dir.join("frame.jpg");
        std::fs::write(&path, b"jpeg").unwrap();

        let camera = StillCamera::new(&path);
        assert_eq!(camera.capture(StreamKind::Video).unwrap().as_ref(), b"jpeg");
        camera.select_video(3).unwrap();
        assert_eq!(camera.selected(), 3);

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            camera.capture(StreamKind::Video),
            Err(LinkError::Capture(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
