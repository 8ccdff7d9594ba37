//! Non-interleaving output for concurrent subprocesses.
//!
//! Each compiler invocation writes its diagnostics to its own
//! [`MuxWriter`], the write end of an OS pipe. A reader thread per writer
//! splits the stream into lines and forwards them, tagged with the writer's
//! id, to a single collector thread. The collector buffers lines per writer
//! and copies a writer's block to the real output only when that writer
//! reaches end-of-stream. Blocks therefore appear whole, in completion
//! order rather than start order.
//!
//! Buffering is unbounded. A C++ template error can be long, but it is
//! still only one compile's worth of text.
//!
//! [`OutputMux::stop`] does not wait on writers that are still open. It
//! gives in-flight lines a short grace period, then flushes whatever is
//! buffered and returns.

use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, PipeReader, PipeWriter, Write};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};

/// Capacity of the reader-to-collector queue.
const QUEUE_CAPACITY: usize = 100;

/// How long a stopping collector waits for streams that are still open.
const STOP_GRACE: Duration = Duration::from_millis(250);

enum MuxMessage {
    Line(usize, String),
    Eof(usize),
    /// Stop after the given number of streams have ended, or after
    /// [`STOP_GRACE`].
    Stop(usize),
}

/// Collects line output from many writers without interleaving it.
pub struct OutputMux<W: Write + Send + 'static> {
    tx: Sender<MuxMessage>,
    next_id: AtomicUsize,
    collector: JoinHandle<io::Result<W>>,
}

impl<W: Write + Send + 'static> OutputMux<W> {
    /// Start a multiplexer writing to `out`.
    pub fn new(out: W) -> Result<Self> {
        let (tx, rx) = bounded(QUEUE_CAPACITY);
        let collector = thread::Builder::new()
            .name("output-mux".to_string())
            .spawn(move || collect(rx, out))
            .context("failed to start output multiplexer")?;

        Ok(OutputMux {
            tx,
            next_id: AtomicUsize::new(0),
            collector,
        })
    }

    /// Create a new writer whose output is emitted as one block once it
    /// (and every clone of it, including any handed to a child process)
    /// has been dropped.
    pub fn new_writer(&self) -> io::Result<MuxWriter> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reader, writer) = io::pipe()?;
        let tx = self.tx.clone();

        thread::Builder::new()
            .name(format!("output-mux-reader-{}", id))
            .spawn(move || forward_lines(id, reader, tx))?;

        Ok(MuxWriter { pipe: writer })
    }

    /// Number of writers created so far.
    pub fn streams_created(&self) -> usize {
        self.next_id.load(Ordering::Relaxed)
    }

    /// Stop the multiplexer and return the underlying output.
    ///
    /// Blocks from writers that already ended are emitted whole. Lines
    /// buffered for a writer that is still open are flushed as they are,
    /// and anything that writer produces afterwards is discarded.
    pub fn stop(self) -> Result<W> {
        let streams = self.streams_created();
        // The collector owns the receiver until it returns.
        let _ = self.tx.send(MuxMessage::Stop(streams));
        drop(self.tx);
        self.collector
            .join()
            .map_err(|_| anyhow!("output multiplexer panicked"))?
            .context("failed to write subprocess output")
    }
}

/// The writing end of one multiplexed stream.
#[derive(Debug)]
pub struct MuxWriter {
    pipe: PipeWriter,
}

impl MuxWriter {
    /// A handle to pass to a child process as its stdout or stderr.
    pub fn stdio(&self) -> io::Result<Stdio> {
        Ok(Stdio::from(self.pipe.try_clone()?))
    }

    /// Another handle writing to the same stream.
    pub fn try_clone(&self) -> io::Result<MuxWriter> {
        Ok(MuxWriter {
            pipe: self.pipe.try_clone()?,
        })
    }
}

impl Write for MuxWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pipe.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.pipe.flush()
    }
}

fn forward_lines(id: usize, reader: PipeReader, tx: Sender<MuxMessage>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                if buf.ends_with(b"\n") {
                    buf.pop();
                    if buf.ends_with(b"\r") {
                        buf.pop();
                    }
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(MuxMessage::Line(id, line)).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!("error reading subprocess output: {}", e);
                break;
            }
        }
    }
    let _ = tx.send(MuxMessage::Eof(id));
}

fn flush_block<W: Write>(out: &mut W, lines: &[String], result: &mut io::Result<()>) {
    if result.is_err() {
        return;
    }
    *result = lines
        .iter()
        .try_for_each(|line| writeln!(out, "{}", line))
        .and_then(|_| out.flush());
}

fn collect<W: Write>(rx: Receiver<MuxMessage>, mut out: W) -> io::Result<W> {
    let mut buffers: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    let mut result = Ok(());
    let mut ended = 0;
    let mut stopping: Option<(usize, Instant)> = None;

    // Keep draining after a write error so readers never block on a full queue.
    loop {
        let msg = match stopping {
            None => rx.recv().ok(),
            Some((streams, _)) if ended >= streams => None,
            Some((_, deadline)) => rx.recv_deadline(deadline).ok(),
        };
        let Some(msg) = msg else { break };

        match msg {
            MuxMessage::Line(id, line) => buffers.entry(id).or_default().push(line),
            MuxMessage::Eof(id) => {
                ended += 1;
                if let Some(lines) = buffers.remove(&id) {
                    flush_block(&mut out, &lines, &mut result);
                }
            }
            MuxMessage::Stop(streams) => {
                stopping = Some((streams, Instant::now() + STOP_GRACE));
            }
        }
    }

    let open = buffers.len();
    if open > 0 {
        tracing::debug!("flushing output of {} unfinished stream(s)", open);
    }

    for (_, lines) in std::mem::take(&mut buffers) {
        flush_block(&mut out, &lines, &mut result);
    }

    result.map(|_| out)
}
