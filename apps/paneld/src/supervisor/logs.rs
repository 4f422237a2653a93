use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing_subscriber::fmt::MakeWriter;

use panel_core::proto::{LogLine, LogStream};

use super::util::now_millis;

/// The operator-visible console: one mixed stream of server output and
/// daemon/system messages, kept as a bounded in-memory ring, streamed to
/// subscribers, and appended best-effort to `panel.log` on disk.
#[derive(Clone)]
pub struct LogStore {
    inner: Arc<Mutex<LogState>>,
}

struct LogState {
    lines: VecDeque<LogLine>,
    tx: broadcast::Sender<LogLine>,
    max_lines: usize,
    file: Option<File>,
}

impl LogStore {
    pub fn new(max_lines: usize) -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(Mutex::new(LogState {
                lines: VecDeque::with_capacity(max_lines.min(1024)),
                tx,
                max_lines: max_lines.max(100),
                file: None,
            })),
        }
    }

    /// Also append every line to `path`. Failure to open is ignored; the
    /// console must keep working without the on-disk log.
    pub fn with_file(self, path: &Path) -> Self {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = OpenOptions::new().create(true).append(true).open(path).ok();
        if let Ok(mut guard) = self.inner.lock() {
            guard.file = file;
        }
        self
    }

    pub fn push(&self, stream: LogStream, line: String) {
        let mut guard = self.inner.lock().expect("log lock poisoned");
        let entry = LogLine {
            at_ms: now_millis(),
            stream,
            line,
        };
        guard.append(entry);
    }

    /// Daemon/system message, shown inline with the server console.
    pub fn push_system(&self, line: String) {
        self.push(LogStream::Stdout, line);
    }

    pub fn tail(&self, lines: usize) -> Vec<LogLine> {
        let guard = self.inner.lock().expect("log lock poisoned");
        let count = lines.min(guard.lines.len());
        guard
            .lines
            .iter()
            .skip(guard.lines.len().saturating_sub(count))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.lock().expect("log lock poisoned");
        guard.lines.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogLine> {
        let guard = self.inner.lock().expect("log lock poisoned");
        guard.tx.subscribe()
    }

    pub fn writer(&self) -> LogWriterFactory {
        LogWriterFactory { store: self.clone() }
    }
}

impl LogState {
    fn append(&mut self, entry: LogLine) {
        if let Some(file) = self.file.as_mut() {
            let _ = writeln!(file, "{}", entry.line);
        }
        while self.lines.len() >= self.max_lines {
            self.lines.pop_front();
        }
        self.lines.push_back(entry.clone());
        let _ = self.tx.send(entry);
    }
}

/// Bridges `tracing` output into the console stream so daemon log lines show
/// up next to server output, as well as on stdout.
pub struct LogWriterFactory {
    store: LogStore,
}

impl<'a> MakeWriter<'a> for LogWriterFactory {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            store: self.store.clone(),
            buffer: Vec::new(),
        }
    }
}

pub struct LogWriter {
    store: LogStore,
    buffer: Vec<u8>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches('\n').to_string();
            if !line.trim().is_empty() {
                self.store.push_system(line);
            }
        }

        io::stdout().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_is_bounded_and_tail_returns_newest() {
        let store = LogStore::new(100);
        for i in 0..150 {
            store.push_system(format!("line {i}"));
        }
        assert_eq!(store.len(), 100);
        let tail = store.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[1].line, "line 149");
        assert_eq!(tail[0].line, "line 148");
    }

    #[test]
    fn subscribers_see_pushed_lines() {
        let store = LogStore::new(100);
        let mut rx = store.subscribe();
        store.push(LogStream::Stderr, "oops".to_string());
        let line = rx.try_recv().expect("line delivered");
        assert_eq!(line.line, "oops");
        assert!(matches!(line.stream, LogStream::Stderr));
    }
}
