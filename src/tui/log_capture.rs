//! Tracing output for TUI mode
//!
//! Log lines written while the alternate screen is up would tear the
//! display, so in TUI mode the subscriber writes into a `LogBuffer` and the
//! status bar shows the most recent line.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

/// Lines kept before the oldest are dropped.
const CAPACITY: usize = 200;

#[derive(Clone, Default)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, line: &str) {
        let line = line.trim_end();
        if line.is_empty() {
            return;
        }
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        if lines.len() == CAPACITY {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
    }

    /// Take everything logged since the last call, oldest first.
    pub fn take(&self) -> Vec<String> {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.drain(..).collect()
    }
}

/// One event's worth of output. The fmt layer writes an event in pieces and
/// drops the writer afterwards, so lines are split out on drop.
pub struct LineWriter {
    sink: LogBuffer,
    bytes: Vec<u8>,
}

impl Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let text = String::from_utf8_lossy(&self.bytes).into_owned();
        self.bytes.clear();
        text.lines().for_each(|line| self.sink.push(line));
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter {
            sink: self.clone(),
            bytes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_on_drop() {
        let logs = LogBuffer::new();
        {
            let mut writer = logs.make_writer();
            write!(writer, "first ").unwrap();
            write!(writer, "line\nsecond line\n").unwrap();
            assert!(logs.take().is_empty());
        }
        assert_eq!(logs.take(), vec!["first line", "second line"]);
        assert!(logs.take().is_empty());
    }

    #[test]
    fn test_oldest_lines_dropped() {
        let logs = LogBuffer::new();
        for i in 0..CAPACITY + 5 {
            logs.push(&format!("line {}", i));
        }

        let lines = logs.take();
        assert_eq!(lines.len(), CAPACITY);
        assert_eq!(lines[0], "line 5");
    }

    #[test]
    fn test_subscriber_writes_into_buffer() {
        let logs = LogBuffer::new();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_target(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("Loaded page {}", 2);
        });

        let lines = logs.take();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("Loaded page 2"));
    }
}
