//! Log file lifecycle.
//!
//! Owns the single append-only log file: whether logging to it is enabled,
//! the attached handle, and the destructive operations (clear, delete). The
//! file may be held open by another process at any time (a text editor, a
//! tail), so delete probes for that before removing anything.
//!
//! The handle is attached lazily on the first write after enabling and is
//! re-attached whenever the file has disappeared from disk.

use crate::logging::format_line;
use log::{error, Level};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;
use thiserror::Error;

pub const LOG_FILE_NAME: &str = "serial_gui.log";
/// Time given to the OS to release our handle before probing the file
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Log file does not exist.")]
    NotFound(PathBuf),
    #[error("Log file is being used by another process. Please close any applications that might be using the log file.")]
    FileLocked(PathBuf),
    #[error("Permission denied: {source}. The log file might be open in another application.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to {action} log file: {source}")]
    Io {
        action: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("Failed to open log file: {source}")]
    ViewerFailed {
        #[source]
        source: io::Error,
    },
}

/// Current state of the log file sink, observed by the front end.
#[derive(Debug)]
pub struct LogFileState {
    path: PathBuf,
    enabled: bool,
    handle: Option<File>,
}

impl LogFileState {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_attached(&self) -> bool {
        self.handle.is_some()
    }

    /// Size on disk, `None` when the file does not exist
    pub fn size_bytes(&self) -> Option<u64> {
        fs::metadata(&self.path).ok().map(|m| m.len())
    }
}

#[derive(Debug)]
pub struct LogLifecycle {
    state: LogFileState,
    settle_delay: Duration,
}

impl LogLifecycle {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            state: LogFileState {
                path: path.into(),
                enabled,
                handle: None,
            },
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn state(&self) -> &LogFileState {
        &self.state
    }

    pub fn path(&self) -> &Path {
        &self.state.path
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled
    }

    fn attach(&mut self) -> io::Result<()> {
        self.detach();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.state.path)?;
        self.state.handle = Some(file);
        Ok(())
    }

    fn detach(&mut self) {
        if let Some(mut file) = self.state.handle.take() {
            if let Err(e) = file.flush() {
                error!("Failed to flush log file: {}", e);
            }
        }
    }

    fn reattach_if_enabled(&mut self) {
        if self.state.enabled {
            if let Err(e) = self.attach() {
                error!("Failed to create log file: {}", e);
            }
        }
    }

    /// Attach a handle if logging is enabled and there is no usable one,
    /// including when the file was removed behind our back.
    pub fn ensure_handle(&mut self) {
        if self.state.enabled && (self.state.handle.is_none() || !self.state.path.exists()) {
            if let Err(e) = self.attach() {
                error!("Failed to create log file: {}", e);
            }
        }
    }

    /// Never touches file contents. Enabling does not attach; the next
    /// append does.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.state.enabled = enabled;
        if !enabled {
            self.detach();
        }
    }

    pub fn append(&mut self, message: &str, level: Level) {
        log::log!(level, "{}", message);

        self.ensure_handle();
        if !self.state.enabled {
            return;
        }
        let Some(file) = self.state.handle.as_mut() else { return };
        let line = format_line(level, message);
        if let Err(e) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
            error!("Failed to write log file {}: {}", self.state.path.display(), e);
            // Drop the broken handle so the next append starts fresh
            self.state.handle = None;
        }
    }

    /// Truncate the log file to zero length, creating it if missing.
    pub fn clear(&mut self) -> Result<(), LogError> {
        self.ensure_handle();
        self.detach();
        let truncated = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.state.path)
            .map(drop);
        // Reattach before reporting so a failed clear still leaves us logging
        self.reattach_if_enabled();
        truncated.map_err(|source| classify_io(&self.state.path, "clear", source))
    }

    /// Remove the log file once nothing else holds it.
    pub fn delete(&mut self) -> Result<(), LogError> {
        if !self.state.path.exists() {
            return Err(LogError::NotFound(self.state.path.clone()));
        }
        self.detach();
        log::logger().flush();
        thread::sleep(self.settle_delay);

        let removed = probe_unlocked(&self.state.path).and_then(|()| {
            fs::remove_file(&self.state.path)
                .map_err(|source| classify_io(&self.state.path, "delete", source))
        });
        if removed.is_err() {
            self.reattach_if_enabled();
        }
        removed
    }

    pub fn size_label(&self) -> String {
        format_size(self.state.size_bytes())
    }

    /// Hand the file to the desktop's default viewer.
    pub fn open_in_viewer(&self) -> Result<(), LogError> {
        let path = &self.state.path;
        if !path.exists() {
            return Err(LogError::NotFound(path.clone()));
        }
        let mut command = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", ""]);
            c
        } else if cfg!(target_os = "macos") {
            Command::new("open")
        } else {
            Command::new("xdg-open")
        };
        command
            .arg(path)
            .spawn()
            .map(drop)
            .map_err(|source| LogError::ViewerFailed { source })
    }
}

impl Drop for LogLifecycle {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Binary-prefix size label: `1023 B`, `1.0 KB`, `1.0 MB`, or `N/A`.
pub fn format_size(size: Option<u64>) -> String {
    match size {
        None => "N/A".to_string(),
        Some(n) if n < 1024 => format!("{} B", n),
        Some(n) if n < 1024 * 1024 => format!("{:.1} KB", n as f64 / 1024.0),
        Some(n) => format!("{:.1} MB", n as f64 / (1024.0 * 1024.0)),
    }
}

fn classify_io(path: &Path, action: &'static str, source: io::Error) -> LogError {
    if source.kind() == io::ErrorKind::PermissionDenied {
        LogError::PermissionDenied { path: path.to_path_buf(), source }
    } else {
        LogError::Io { action, source }
    }
}

#[cfg(windows)]
const ERROR_SHARING_VIOLATION: i32 = 32;
#[cfg(windows)]
const ERROR_LOCK_VIOLATION: i32 = 33;

/// Open the file without modifying it to find out whether another process
/// holds it exclusively.
fn probe_unlocked(path: &Path) -> Result<(), LogError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Err(LogError::FileLocked(path.to_path_buf()))
        }
        #[cfg(windows)]
        Err(e) if matches!(e.raw_os_error(), Some(ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION)) => {
            return Err(LogError::FileLocked(path.to_path_buf()))
        }
        Err(source) => return Err(classify_io(path, "delete", source)),
    };
    probe_advisory_lock(&file, path)
}

#[cfg(unix)]
fn probe_advisory_lock(file: &File, path: &Path) -> Result<(), LogError> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    // SAFETY: fd is owned by `file`, which outlives both calls
    let rc = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        return if err.kind() == io::ErrorKind::WouldBlock {
            Err(LogError::FileLocked(path.to_path_buf()))
        } else {
            Err(classify_io(path, "delete", err))
        };
    }
    unsafe { libc::flock(fd, libc::LOCK_UN) };
    Ok(())
}

#[cfg(not(unix))]
fn probe_advisory_lock(_file: &File, _path: &Path) -> Result<(), LogError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lifecycle(dir: &TempDir, enabled: bool) -> LogLifecycle {
        LogLifecycle::new(dir.path().join(LOG_FILE_NAME), enabled).with_settle_delay(Duration::ZERO)
    }

    fn contents(log: &LogLifecycle) -> String {
        fs::read_to_string(log.path()).unwrap()
    }

    #[test]
    fn test_size_label_boundaries() {
        assert_eq!(format_size(None), "N/A");
        assert_eq!(format_size(Some(0)), "0 B");
        assert_eq!(format_size(Some(1023)), "1023 B");
        assert_eq!(format_size(Some(1024)), "1.0 KB");
        assert_eq!(format_size(Some(1536)), "1.5 KB");
        assert_eq!(format_size(Some(1024 * 1024 - 1)), "1024.0 KB");
        assert_eq!(format_size(Some(1048576)), "1.0 MB");
        assert_eq!(format_size(Some(5 * 1024 * 1024 + 512 * 1024)), "5.5 MB");
    }

    #[test]
    fn test_size_label_reads_disk() {
        let dir = TempDir::new().unwrap();
        let log = lifecycle(&dir, false);
        assert_eq!(log.size_label(), "N/A");

        File::create(log.path()).unwrap().set_len(1023).unwrap();
        assert_eq!(log.size_label(), "1023 B");
        OpenOptions::new().write(true).open(log.path()).unwrap().set_len(1048576).unwrap();
        assert_eq!(log.size_label(), "1.0 MB");
    }

    #[test]
    fn test_attach_is_lazy() {
        let dir = TempDir::new().unwrap();
        let mut log = lifecycle(&dir, false);
        log.set_enabled(true);
        assert!(!log.state().is_attached());
        assert!(!log.path().exists());

        log.append("Ready - Please select a serial port", Level::Info);
        assert!(log.state().is_attached());
        let text = contents(&log);
        assert!(text.ends_with(" - INFO - Ready - Please select a serial port\n"), "{text:?}");
    }

    #[test]
    fn test_disabled_append_leaves_file_alone() {
        let dir = TempDir::new().unwrap();
        let mut log = lifecycle(&dir, true);
        log.append("first", Level::Info);
        let before = log.state().size_bytes();

        log.set_enabled(false);
        assert!(!log.state().is_attached());
        log.append("second", Level::Error);
        assert_eq!(log.state().size_bytes(), before);
        assert!(!contents(&log).contains("second"));
    }

    #[test]
    fn test_delete_then_append_recreates_file() {
        let dir = TempDir::new().unwrap();
        let mut log = lifecycle(&dir, true);
        log.append("Sent command: i", Level::Info);

        log.delete().unwrap();
        assert_eq!(log.size_label(), "N/A");
        assert!(!log.state().is_attached());

        log.append("Sent command: o", Level::Info);
        assert!(log.path().exists());
        let text = contents(&log);
        assert!(text.contains("Sent command: o"));
        assert!(!text.contains("Sent command: i"));
    }

    #[test]
    fn test_external_removal_self_heals() {
        let dir = TempDir::new().unwrap();
        let mut log = lifecycle(&dir, true);
        log.append("one", Level::Info);
        fs::remove_file(log.path()).unwrap();

        log.append("two", Level::Warn);
        assert_eq!(contents(&log).lines().count(), 1);
        assert!(contents(&log).contains(" - WARN - two"));
    }

    #[test]
    fn test_clear_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut log = lifecycle(&dir, true);
        assert!(!log.path().exists());

        log.clear().unwrap();
        assert!(log.path().exists());
        assert_eq!(log.state().size_bytes(), Some(0));
        assert!(log.is_enabled());
        assert!(log.state().is_attached());
    }

    #[test]
    fn test_clear_truncates_and_keeps_logging() {
        let dir = TempDir::new().unwrap();
        let mut log = lifecycle(&dir, true);
        for i in 0..10 {
            log.append(&format!("line {i}"), Level::Info);
        }
        log.clear().unwrap();
        assert_eq!(log.size_label(), "0 B");

        log.append("Log file cleared", Level::Info);
        assert_eq!(contents(&log).lines().count(), 1);
    }

    #[test]
    fn test_clear_while_disabled_does_not_attach() {
        let dir = TempDir::new().unwrap();
        let mut log = lifecycle(&dir, false);
        fs::write(log.path(), "old\n").unwrap();
        log.clear().unwrap();
        assert_eq!(log.state().size_bytes(), Some(0));
        assert!(!log.state().is_attached());
    }

    #[test]
    fn test_failed_clear_keeps_logging() {
        let dir = TempDir::new().unwrap();
        let mut log = lifecycle(&dir, true);
        // A directory at the log path cannot be truncated or appended to
        fs::create_dir(log.path()).unwrap();
        assert!(matches!(log.clear(), Err(LogError::Io { action: "clear", .. })));

        fs::remove_dir(log.path()).unwrap();
        log.append("Sent command: o", Level::Info);
        assert!(log.state().is_attached());
        assert!(contents(&log).contains(" - INFO - Sent command: o"));
    }

    #[test]
    fn test_delete_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut log = lifecycle(&dir, true);
        assert!(matches!(log.delete(), Err(LogError::NotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_delete_refuses_locked_file() {
        use std::os::unix::io::AsRawFd;

        let dir = TempDir::new().unwrap();
        let mut log = lifecycle(&dir, true);
        log.append("held elsewhere", Level::Info);

        let holder = File::open(log.path()).unwrap();
        let rc = unsafe { libc::flock(holder.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        assert_eq!(rc, 0);

        let err = log.delete().unwrap_err();
        assert!(matches!(err, LogError::FileLocked(_)), "{err:?}");
        assert!(log.path().exists());
        assert!(log.state().is_attached());

        drop(holder);
        log.delete().unwrap();
        assert!(!log.path().exists());
    }

    #[test]
    fn test_drop_flushes_and_releases() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        {
            let mut log = LogLifecycle::new(&path, true);
            log.append("bye", Level::Info);
        }
        assert!(fs::read_to_string(&path).unwrap().contains("bye"));
    }

    #[test]
    fn test_open_missing_file_in_viewer() {
        let dir = TempDir::new().unwrap();
        let log = lifecycle(&dir, false);
        assert!(matches!(log.open_in_viewer(), Err(LogError::NotFound(_))));
    }
}
