//! Login tail loop
//!
//! Follows the authentication log from its current end and records every
//! successful SSH login that appears after startup. Historical lines are
//! never reprocessed. If the log cannot be opened the loop exits silently
//! and the rest of the process keeps running.
//!
//! Log rotation is not handled: once the file is rotated or truncated the
//! open handle keeps reading the old inode and goes quiet until the
//! process restarts.

use crate::collectors::sleep_while_running;
use crate::records::LoginEvent;
use crate::sink::RecordSink;
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Line must reference the SSH daemon to be considered
const SSH_DAEMON_MARKER: &str = "sshd";

/// Line must carry the success marker sshd logs for accepted logins
const SUCCESS_MARKER: &str = "Accepted";

/// Whether a log line records a successful SSH login
pub(crate) fn is_successful_login(line: &str) -> bool {
    line.contains(SSH_DAEMON_MARKER) && line.contains(SUCCESS_MARKER)
}

/// Background loop recording successful SSH logins from the auth log
pub struct LoginTailer {
    path: PathBuf,
    poll_interval: Duration,
    sink: Arc<dyn RecordSink>,
    thread_handle: Option<JoinHandle<()>>,
    running: Arc<Mutex<bool>>,
}

impl LoginTailer {
    /// Wire a tail loop for the log at `path`
    pub fn new(path: PathBuf, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            path,
            poll_interval: Duration::from_secs(1),
            sink,
            thread_handle: None,
            running: Arc::new(Mutex::new(false)),
        }
    }

    /// Shorten the idle poll interval, for tests
    #[cfg(test)]
    pub(crate) fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Start the tail loop on a background thread
    ///
    /// The log file is opened on the background thread; when it cannot be
    /// opened the thread logs the error and exits without affecting the
    /// rest of the process. Starting an already-running tailer is a no-op.
    pub fn start(&mut self) {
        {
            let mut running = self.running.lock().unwrap();
            if *running {
                return;
            }
            *running = true;
        }

        let path = self.path.clone();
        let poll_interval = self.poll_interval;
        let sink = Arc::clone(&self.sink);
        let running = Arc::clone(&self.running);

        let handle = thread::spawn(move || {
            Self::tail_loop(path, poll_interval, sink, running);
        });

        self.thread_handle = Some(handle);
        info!("Login tailer started for {}", self.path.display());
    }

    /// Signal the loop to stop and wait for the thread to finish
    pub fn stop(&mut self) {
        {
            let mut running = self.running.lock().unwrap();
            *running = false;
        }

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("Failed to join login tailer thread");
            }
        }
        info!("Login tailer stopped");
    }

    /// Whether the loop is currently running
    pub fn is_running(&self) -> bool {
        *self.running.lock().unwrap()
    }

    fn tail_loop(
        path: PathBuf,
        poll_interval: Duration,
        sink: Arc<dyn RecordSink>,
        running: Arc<Mutex<bool>>,
    ) {
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                error!(
                    "Cannot open auth log {}, login tailing disabled: {}",
                    path.display(),
                    e
                );
                *running.lock().unwrap() = false;
                return;
            }
        };

        let mut reader = BufReader::new(file);
        if let Err(e) = reader.seek(SeekFrom::End(0)) {
            error!(
                "Cannot seek to end of {}, login tailing disabled: {}",
                path.display(),
                e
            );
            *running.lock().unwrap() = false;
            return;
        }

        info!("Tailing {} from current end", path.display());

        while *running.lock().unwrap() {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => {
                    // Nothing new yet; plain polling, no backoff
                    sleep_while_running(poll_interval, &running);
                }
                Ok(_) => {
                    if is_successful_login(&line) {
                        let event = LoginEvent::detected_now(&line);
                        debug!("Detected successful login: {}", event.log_entry);
                        if let Err(e) = sink.write_login(&event) {
                            error!("Failed to persist login event: {}", e);
                        }
                    }
                }
                Err(e) => {
                    warn!("Error reading {}: {}", path.display(), e);
                    sleep_while_running(poll_interval, &running);
                }
            }
        }

        {
            let mut running_flag = running.lock().unwrap();
            *running_flag = false;
        }
        info!("Login tail loop finished");
    }
}

impl Drop for LoginTailer {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ACCEPTED: &str = "sshd[123]: Accepted password for alice from 10.0.0.5 port 52114 ssh2";
    const FAILED: &str = "sshd[123]: Failed password for alice from 10.0.0.5 port 52114 ssh2";

    fn start_tailer(path: PathBuf, sink: Arc<MemorySink>) -> LoginTailer {
        let mut tailer = LoginTailer::new(path, sink)
            .with_poll_interval(Duration::from_millis(20));
        tailer.start();
        // Give the thread time to open the file and seek to its end
        thread::sleep(Duration::from_millis(150));
        tailer
    }

    fn append_line(file: &NamedTempFile, line: &str) {
        let mut handle = std::fs::OpenOptions::new()
            .append(true)
            .open(file.path())
            .unwrap();
        writeln!(handle, "{}", line).unwrap();
        handle.flush().unwrap();
    }

    #[test]
    fn test_matcher_requires_both_markers() {
        assert!(is_successful_login(ACCEPTED));
        assert!(!is_successful_login(FAILED));
        assert!(!is_successful_login("cron[99]: Accepted job"));
        assert!(!is_successful_login("sshd[123]: Connection closed"));
        assert!(!is_successful_login(""));
    }

    #[test]
    fn test_appended_accepted_line_produces_one_verbatim_event() {
        let file = NamedTempFile::new().unwrap();
        let sink = Arc::new(MemorySink::new());
        let mut tailer = start_tailer(file.path().to_path_buf(), sink.clone());

        append_line(&file, ACCEPTED);
        thread::sleep(Duration::from_millis(300));
        tailer.stop();

        let events = sink.logins();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].log_entry, ACCEPTED);
    }

    #[test]
    fn test_failed_login_line_produces_no_event() {
        let file = NamedTempFile::new().unwrap();
        let sink = Arc::new(MemorySink::new());
        let mut tailer = start_tailer(file.path().to_path_buf(), sink.clone());

        append_line(&file, FAILED);
        thread::sleep(Duration::from_millis(300));
        tailer.stop();

        assert!(sink.logins().is_empty());
    }

    #[test]
    fn test_preexisting_lines_are_never_reprocessed() {
        let file = NamedTempFile::new().unwrap();
        for i in 0..5 {
            append_line(
                &file,
                &format!("sshd[{}]: Accepted password for olduser{} ssh2", i, i),
            );
        }

        let sink = Arc::new(MemorySink::new());
        let mut tailer = start_tailer(file.path().to_path_buf(), sink.clone());

        for i in 0..3 {
            append_line(
                &file,
                &format!("sshd[{}]: Accepted publickey for newuser{} ssh2", 100 + i, i),
            );
        }
        thread::sleep(Duration::from_millis(400));
        tailer.stop();

        let events = sink.logins();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.log_entry.contains("newuser")));
        assert!(!events.iter().any(|e| e.log_entry.contains("olduser")));
    }

    #[test]
    fn test_detection_timestamps_are_monotonic() {
        let file = NamedTempFile::new().unwrap();
        let sink = Arc::new(MemorySink::new());
        let mut tailer = start_tailer(file.path().to_path_buf(), sink.clone());

        for _ in 0..3 {
            append_line(&file, ACCEPTED);
            thread::sleep(Duration::from_millis(80));
        }
        thread::sleep(Duration::from_millis(300));
        tailer.stop();

        let events = sink.logins();
        assert_eq!(events.len(), 3);
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        // Identical lines are recorded every time, no deduplication
        assert!(events.iter().all(|e| e.log_entry == ACCEPTED));
    }

    #[test]
    fn test_missing_log_file_ends_the_loop_silently() {
        let sink = Arc::new(MemorySink::new());
        let mut tailer = LoginTailer::new(PathBuf::from("/nonexistent/auth.log"), sink.clone())
            .with_poll_interval(Duration::from_millis(20));

        tailer.start();
        thread::sleep(Duration::from_millis(200));

        // The thread exited on its own without producing anything
        assert!(!tailer.is_running());
        assert!(sink.logins().is_empty());
        tailer.stop();
    }

    #[test]
    fn test_sink_failure_does_not_stop_the_loop() {
        let file = NamedTempFile::new().unwrap();
        let sink = Arc::new(MemorySink::failing());
        let mut tailer = start_tailer(file.path().to_path_buf(), sink.clone());

        append_line(&file, ACCEPTED);
        append_line(&file, ACCEPTED);
        thread::sleep(Duration::from_millis(300));

        assert!(tailer.is_running());
        assert!(sink.write_attempts() >= 2);
        assert!(sink.logins().is_empty());
        tailer.stop();
    }
}
