//! Terminal front end: alerts and panel logs to stdout/stderr, artifacts to
//! an output directory.

#[cfg(test)]
#[path = "console_test.rs"]
mod tests;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::PoisonError;

use stimulus_client::ui::{LogPanel, Severity, StatusText, UiSink};

pub struct ConsoleUi {
    out_dir: PathBuf,
    last_progress: Mutex<Option<u8>>,
    saved: Mutex<Vec<PathBuf>>,
}

impl ConsoleUi {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self { out_dir: out_dir.into(), last_progress: Mutex::new(None), saved: Mutex::new(Vec::new()) }
    }

    /// Paths of artifacts written so far.
    pub fn saved(&self) -> Vec<PathBuf> {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Artifact path inside the output directory. Only the final path
    /// component of the server-supplied name is used.
    fn artifact_path(&self, file: &str) -> io::Result<PathBuf> {
        let name = Path::new(file)
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("bad artifact name: {file}")))?;
        Ok(self.out_dir.join(name))
    }
}

impl UiSink for ConsoleUi {
    fn alert(&self, message: &str) {
        println!("==> {message}");
    }

    fn log(&self, panel: LogPanel, message: &str, severity: Severity) {
        match severity {
            Severity::Info => println!("[{}] {message}", panel.label()),
            Severity::Error => eprintln!("[{}] ERROR {message}", panel.label()),
        }
    }

    fn clear_logs(&self) {}

    fn set_progress(&self, percent: u8) {
        let mut last = self.last_progress.lock().unwrap_or_else(PoisonError::into_inner);
        if *last != Some(percent) {
            *last = Some(percent);
            println!("progress {percent}%");
        }
    }

    fn set_status(&self, status: StatusText) {
        match status {
            StatusText::Hidden => {}
            StatusText::Generating => println!("Generating..."),
            StatusText::Finalizing => println!("Finalizing results..."),
        }
    }

    fn set_controls(&self, start_enabled: bool, stop_enabled: bool) {
        tracing::debug!(start_enabled, stop_enabled, "controls");
    }

    fn set_locked(&self, locked: bool) {
        tracing::debug!(locked, "input lock");
    }

    fn request_reload(&self) {
        eprintln!("session is no longer valid; open a new session and rerun with its token");
    }

    fn deliver_artifact(&self, file: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.artifact_path(file)?;
        std::fs::create_dir_all(&self.out_dir)?;
        std::fs::write(&path, bytes)?;
        println!("saved {}", path.display());
        self.saved.lock().unwrap_or_else(PoisonError::into_inner).push(path);
        Ok(())
    }
}
