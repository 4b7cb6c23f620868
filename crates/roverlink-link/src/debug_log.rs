use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use tracing::warn;

/// Appends peer status text to a file, one line per message.
///
/// Disabled when no path is given; write failures are logged and dropped.
#[derive(Debug, Default)]
pub struct DebugLog {
    file: Option<File>,
}

impl DebugLog {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self { file: Some(file) })
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    pub fn append(&mut self, text: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        if let Err(err) = writeln!(file, "{text}") {
            warn!(error = %err, "debug log write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_lines() {
        let path = std::env::temp_dir().join(format!("roverlink-debug-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let mut log = DebugLog::open(&path).unwrap();
        assert!(log.is_enabled());
        log.append("battery low");
        log.append("arm stalled");
        drop(log);

        let mut reopened = DebugLog::open(&path).unwrap();
        reopened.append("third");

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "battery low\narm stalled\nthird\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn disabled_log_ignores_text() {
        let mut log = DebugLog::disabled();
        assert!(!log.is_enabled());
        log.append("nothing happens");
    }
}
