//! Stream handling for process output

use crate::errors::Result;
use log::{Level, debug, warn};
use std::io::{self, BufRead, BufReader, Read};
use std::mem;
use std::thread;

/// Log target used for lines drained from child processes
pub const PROCESS_LOG_TARGET: &str = "isolate_rs::process";

/// Callback receiving each materialized line of a drained stream
pub type LineSink = Box<dyn FnMut(&str) + Send + 'static>;

/// Sink forwarding every line to the `log` facade at `level`
pub fn log_sink(level: Level) -> LineSink {
    Box::new(move |line: &str| log::log!(target: PROCESS_LOG_TARGET, level, "{}", line))
}

/// Line-buffering state for one stream.
///
/// Whitespace-only lines are held back and glued in front of the next line
/// with visible content. A run of blank lines at the very end of the stream
/// never reaches the sink; it only shows up in the raw text.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
    raw: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line exactly as read, terminator included.
    ///
    /// Returns the text for the sink when this line has visible content.
    pub fn push(&mut self, line: &str) -> Option<String> {
        self.raw.push_str(line);

        let stripped = line.strip_suffix('\n').unwrap_or(line);
        if stripped.trim().is_empty() {
            self.pending.push_str(line);
            return None;
        }

        let mut materialized = mem::take(&mut self.pending);
        materialized.push_str(stripped);
        Some(materialized)
    }

    /// Blank lines still waiting for a line to attach to
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Everything fed so far, byte for byte
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn into_raw(self) -> String {
        self.raw
    }
}

/// Read `stream` until EOF, forwarding lines to `sink`.
///
/// Bytes that are not valid UTF-8 are replaced, not treated as an error.
/// A read error stops the sink and the captured text at that point, but
/// the rest of the stream is still consumed so the writer never hits a
/// closed pipe.
pub fn drain<R: Read>(stream: R, mut sink: impl FnMut(&str)) -> String {
    let mut reader = BufReader::new(stream);
    let mut buffer = LineBuffer::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                if let Some(text) = buffer.push(&String::from_utf8_lossy(&line)) {
                    sink(&text);
                }
            }
            Err(e) => {
                debug!("stream drain stopped: {}", e);
                discard(&mut reader);
                break;
            }
        }
    }

    buffer.into_raw()
}

/// Consume whatever is left of `reader` without keeping it
fn discard<R: Read>(reader: &mut R) {
    if let Err(e) = io::copy(reader, &mut io::sink()) {
        debug!("discarding rest of stream failed: {}", e);
    }
}

/// Worker draining one stream on its own thread
pub struct StreamDrainer {
    handle: thread::JoinHandle<String>,
}

impl StreamDrainer {
    /// Start draining `stream` in the background
    pub fn spawn<R>(name: &str, stream: R, sink: LineSink) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(format!("drain-{}", name))
            .spawn(move || drain(stream, sink))?;

        Ok(Self { handle })
    }

    /// Block until the stream is fully drained and return its raw text
    pub fn result(self) -> String {
        match self.handle.join() {
            Ok(text) => text,
            Err(_) => {
                warn!("stream drainer panicked; captured output lost");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    fn collect(input: &str) -> (Vec<String>, String) {
        let mut lines = Vec::new();
        let raw = drain(Cursor::new(input.to_string()), |line| {
            lines.push(line.to_string())
        });
        (lines, raw)
    }

    #[test]
    fn non_blank_lines_are_emitted_without_terminator() {
        let (lines, raw) = collect("one\ntwo\n");
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(raw, "one\ntwo\n");
    }

    #[test]
    fn blank_lines_are_glued_to_next_line() {
        let (lines, raw) = collect("\n\nhello\n");
        assert_eq!(lines, vec!["\n\nhello"]);
        assert_eq!(raw, "\n\nhello\n");
    }

    #[test]
    fn whitespace_only_lines_count_as_blank() {
        let (lines, _) = collect("a\n  \t\nb\n");
        assert_eq!(lines, vec!["a", "  \t\nb"]);
    }

    #[test]
    fn trailing_blank_lines_never_reach_the_sink() {
        // Trailing blank runs stay in the raw text only.
        let (lines, raw) = collect("first\nsecond\n\n   \n");
        assert_eq!(lines, vec!["first", "second"]);
        assert_eq!(raw, "first\nsecond\n\n   \n");
    }

    #[test]
    fn last_line_without_newline_is_emitted() {
        let (lines, raw) = collect("a\nb");
        assert_eq!(lines, vec!["a", "b"]);
        assert_eq!(raw, "a\nb");
    }

    #[test]
    fn empty_stream_yields_nothing() {
        let (lines, raw) = collect("");
        assert!(lines.is_empty());
        assert!(raw.is_empty());
    }

    #[test]
    fn line_buffer_tracks_pending_blank_run() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push("\n"), None);
        assert_eq!(buffer.push(" \n"), None);
        assert_eq!(buffer.pending(), "\n \n");

        assert_eq!(buffer.push("x\n").as_deref(), Some("\n \nx"));
        assert!(buffer.pending().is_empty());
        assert_eq!(buffer.raw(), "\n \nx\n");
    }

    /// Serves `chunks` in order; `None` is a read error
    struct ScriptedReader {
        chunks: Vec<Option<&'static [u8]>>,
        reads: usize,
    }

    impl ScriptedReader {
        fn new(chunks: Vec<Option<&'static [u8]>>) -> Self {
            Self { chunks, reads: 0 }
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let chunk = self.chunks.get(self.reads).copied();
            self.reads += 1;
            match chunk {
                None => Ok(0),
                Some(None) => Err(io::Error::other("broken stream")),
                Some(Some(data)) => {
                    buf[..data.len()].copy_from_slice(data);
                    Ok(data.len())
                }
            }
        }
    }

    #[test]
    fn read_error_stops_sink_and_keeps_partial_output() {
        let mut lines = Vec::new();
        let raw = drain(ScriptedReader::new(vec![Some(b"kept\n"), None]), |line| {
            lines.push(line.to_string())
        });
        assert_eq!(lines, vec!["kept"]);
        assert_eq!(raw, "kept\n");
    }

    #[test]
    fn read_error_still_consumes_rest_of_stream() {
        let mut reader = ScriptedReader::new(vec![
            Some(b"kept\n"),
            None,
            Some(b"dropped\n"),
            Some(b"also dropped\n"),
        ]);
        let mut lines = Vec::new();
        let raw = drain(&mut reader, |line| lines.push(line.to_string()));

        assert_eq!(lines, vec!["kept"]);
        assert_eq!(raw, "kept\n");
        // every chunk plus the final EOF read
        assert_eq!(reader.reads, 5);
    }

    #[test]
    fn invalid_utf8_is_replaced_and_draining_continues() {
        let bytes: Vec<u8> = b"ok\n\xff\xfe\nlater\n".to_vec();
        let mut lines = Vec::new();
        let raw = drain(Cursor::new(bytes), |line| lines.push(line.to_string()));

        assert_eq!(lines, vec!["ok", "\u{FFFD}\u{FFFD}", "later"]);
        assert_eq!(raw, "ok\n\u{FFFD}\u{FFFD}\nlater\n");
    }

    #[test]
    fn drainer_thread_returns_captured_text() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: LineSink = Box::new(move |line: &str| {
            sink_seen.lock().unwrap().push(line.to_string());
        });

        let drainer = StreamDrainer::spawn("test", Cursor::new("a\n\nb\n\n"), sink).unwrap();
        assert_eq!(drainer.result(), "a\n\nb\n\n");
        assert_eq!(*seen.lock().unwrap(), vec!["a", "\nb"]);
    }
}
