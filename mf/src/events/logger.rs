//! Event Logger - persists run events to JSONL files
//!
//! The EventLogger subscribes to the EventBus and writes every event to a
//! per-run `events.jsonl` file, which `mf trace` later replays.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::bus::EventBus;
use super::types::{EventLogEntry, FlowEvent};

/// Event logger that writes events to `{runs_dir}/{run-id}/events.jsonl`
pub struct EventLogger {
    runs_dir: PathBuf,
    /// Open file writers per run
    writers: HashMap<String, BufWriter<File>>,
}

impl EventLogger {
    pub fn new(runs_dir: impl AsRef<Path>) -> Self {
        let runs_dir = runs_dir.as_ref().to_path_buf();
        debug!(?runs_dir, "EventLogger::new: creating logger");
        Self {
            runs_dir,
            writers: HashMap::new(),
        }
    }

    /// Write an event to its run's log file
    pub fn write_event(&mut self, event: &FlowEvent) -> eyre::Result<()> {
        let run_id = event.run_id().to_string();
        debug!(%run_id, event_type = event.event_type(), "EventLogger::write_event");

        if !self.writers.contains_key(&run_id) {
            let run_dir = self.runs_dir.join(&run_id);
            fs::create_dir_all(&run_dir)?;

            let log_path = run_dir.join("events.jsonl");
            debug!(?log_path, "EventLogger: creating new log file");
            let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
            self.writers.insert(run_id.clone(), BufWriter::new(file));
        }

        let Some(writer) = self.writers.get_mut(&run_id) else {
            return Err(eyre::eyre!("no writer for run {}", run_id));
        };

        let entry = EventLogEntry::new(event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        Ok(())
    }

    /// Close the writer of a finished run
    pub fn close_run(&mut self, run_id: &str) {
        debug!(%run_id, "EventLogger::close_run");
        if let Some(mut writer) = self.writers.remove(run_id) {
            let _ = writer.flush();
        }
    }

    /// Consume events from the bus until it closes
    pub async fn run(mut self, event_bus: Arc<EventBus>) {
        let rx = event_bus.subscribe();
        // Drop our bus handle so the loop ends when the owner drops theirs
        drop(event_bus);
        self.run_with(rx).await;
    }

    /// Consume events from an existing subscription until the bus closes
    pub async fn run_with(mut self, mut rx: broadcast::Receiver<FlowEvent>) {
        debug!("EventLogger::run: starting event logger");
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let run_id = event.run_id().to_string();
                    let terminal = event.is_terminal();

                    if let Err(e) = self.write_event(&event) {
                        error!(%run_id, error = %e, "EventLogger: failed to write event");
                    }

                    if terminal {
                        self.close_run(&run_id);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "EventLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventLogger: channel closed, shutting down");
                    break;
                }
            }
        }

        for (run_id, mut writer) in self.writers.drain() {
            debug!(%run_id, "EventLogger: flushing writer on shutdown");
            let _ = writer.flush();
        }
    }
}

/// Read events from a run's log file
pub fn read_run_events(runs_dir: impl AsRef<Path>, run_id: &str) -> eyre::Result<Vec<EventLogEntry>> {
    let log_path = runs_dir.as_ref().join(run_id).join("events.jsonl");
    debug!(?log_path, "read_run_events: reading log file");

    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&log_path)?;
    let mut entries = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(line, error = %e, "read_run_events: failed to parse line");
            }
        }
    }

    debug!(count = entries.len(), "read_run_events: loaded entries");
    Ok(entries)
}

/// List run ids that have an event log, newest first
pub fn list_runs(runs_dir: impl AsRef<Path>) -> eyre::Result<Vec<String>> {
    let runs_dir = runs_dir.as_ref();
    if !runs_dir.exists() {
        return Ok(Vec::new());
    }
    let mut runs: Vec<String> = fs::read_dir(runs_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().join("events.jsonl").exists())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    // v7 uuids sort by creation time
    runs.sort_unstable_by(|a, b| b.cmp(a));
    Ok(runs)
}

/// Spawn the event logger as a background task
///
/// The subscription is taken before returning so no event emitted after this
/// call is missed.
pub fn spawn_event_logger(
    event_bus: &EventBus,
    runs_dir: impl AsRef<Path>,
) -> eyre::Result<tokio::task::JoinHandle<()>> {
    fs::create_dir_all(runs_dir.as_ref())?;
    let logger = EventLogger::new(runs_dir);
    let rx = event_bus.subscribe();
    Ok(tokio::spawn(logger.run_with(rx)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn visited(run_id: &str, node_id: &str) -> FlowEvent {
        FlowEvent::NodeVisited {
            run_id: run_id.to_string(),
            node_id: node_id.to_string(),
            occurrence: 0,
            name: node_id.to_string(),
        }
    }

    #[test]
    fn test_write_event() {
        let temp = tempdir().unwrap();
        let mut logger = EventLogger::new(temp.path());

        logger.write_event(&visited("run-123", "ucd.change_prompt")).unwrap();

        let log_path = temp.path().join("run-123").join("events.jsonl");
        let content = fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("NodeVisited"));
        assert!(content.contains("ucd.change_prompt"));
    }

    #[test]
    fn test_read_run_events_in_order() {
        let temp = tempdir().unwrap();
        let mut logger = EventLogger::new(temp.path());

        logger.write_event(&visited("run-read", "a")).unwrap();
        logger.write_event(&visited("run-read", "b")).unwrap();
        logger.write_event(&visited("other-run", "c")).unwrap();

        let entries = read_run_events(temp.path(), "run-read").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].event, visited("run-read", "b"));
    }

    #[test]
    fn test_read_nonexistent_run() {
        let temp = tempdir().unwrap();
        assert!(read_run_events(temp.path(), "nonexistent").unwrap().is_empty());
    }

    #[test]
    fn test_list_runs() {
        let temp = tempdir().unwrap();
        let mut logger = EventLogger::new(temp.path());
        logger.write_event(&visited("0001", "a")).unwrap();
        logger.write_event(&visited("0002", "a")).unwrap();
        fs::create_dir_all(temp.path().join("empty-dir")).unwrap();

        assert_eq!(list_runs(temp.path()).unwrap(), vec!["0002", "0001"]);
    }

    #[tokio::test]
    async fn test_logger_closes_run_on_terminal_event() {
        let temp = tempdir().unwrap();
        let bus = Arc::new(EventBus::new(16));
        let handle = spawn_event_logger(&bus, temp.path()).unwrap();

        let emitter = bus.emitter_for("run-bg");
        emitter.node_visited("a", 0, "A");
        emitter.run_completed(true, 1);
        drop(emitter);
        drop(bus);
        handle.await.unwrap();

        let entries = read_run_events(temp.path(), "run-bg").unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[1].event.is_terminal());
    }
}
