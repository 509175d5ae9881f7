use crate::models::ActivityEvent;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;

/// Tail a JSONL event file and parse activity events
pub struct EventTailer {
    file_path: PathBuf,
    reader: Option<BufReader<File>>,
}

impl EventTailer {
    pub fn new(file_path: PathBuf) -> Self {
        EventTailer {
            file_path,
            reader: None,
        }
    }

    /// Open the file and seek to its end to start tailing
    pub fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let file = File::open(&self.file_path)?;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::End(0))?;
        self.reader = Some(reader);
        Ok(())
    }

    /// Read all events appended since the last call.
    ///
    /// Malformed lines are skipped with a debug log; a single bad line never
    /// stops the stream.
    pub fn read_events(&mut self) -> Result<Vec<ActivityEvent>, Box<dyn std::error::Error>> {
        if self.reader.is_none() {
            self.initialize()?;
        }

        let reader = self.reader.as_mut().ok_or("Reader not initialized")?;
        let mut events = Vec::new();

        loop {
            let mut line = String::new();
            let bytes_read = reader.read_line(&mut line)?;
            if bytes_read == 0 {
                break; // EOF
            }

            match parse_event_line(&line) {
                Some(event) => events.push(event),
                None => {
                    if !line.trim().is_empty() {
                        log::debug!("Skipping malformed event line");
                    }
                }
            }
        }

        Ok(events)
    }

    /// Check if the file still exists and is readable
    pub fn is_valid(&self) -> bool {
        self.file_path.exists()
    }
}

/// Parse one JSONL line into an event. Empty and malformed lines yield None.
fn parse_event_line(line: &str) -> Option<ActivityEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

// ============================================
// Async Event Tailer
// ============================================

use tokio::fs::File as AsyncFile;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader as AsyncBufReader};
use tokio::time::{sleep, Duration as TokioDuration};

use crate::engine::queue::IngestQueue;

/// Async version of EventTailer for use with tokio
pub struct AsyncEventTailer {
    file_path: PathBuf,
}

impl AsyncEventTailer {
    pub fn new(file_path: PathBuf) -> Self {
        AsyncEventTailer { file_path }
    }

    /// Run the tailer, submitting events to the ingest queue.
    ///
    /// Runs until the queue closes or an unrecoverable error occurs.
    pub async fn run(
        &mut self,
        queue: IngestQueue,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let file = AsyncFile::open(&self.file_path).await?;
        let mut reader = AsyncBufReader::new(file);

        // Seek to end of file to start tailing
        reader.seek(std::io::SeekFrom::End(0)).await?;

        log::info!("Event tailer started for {:?}", self.file_path);

        loop {
            let mut line = String::new();

            match reader.read_line(&mut line).await {
                Ok(0) => {
                    // EOF - wait for more data
                    sleep(TokioDuration::from_millis(100)).await;
                }
                Ok(_) => {
                    if let Some(event) = parse_event_line(&line) {
                        if queue.is_closed() {
                            log::info!("Ingest queue closed, stopping event tailer");
                            break;
                        }
                        queue.submit(event);
                    } else if !line.trim().is_empty() {
                        log::debug!("Skipping malformed event line");
                    }
                }
                Err(e) => {
                    log::error!("Error reading event file: {}", e);
                    sleep(TokioDuration::from_secs(1)).await;
                }
            }
        }

        Ok(())
    }
}
