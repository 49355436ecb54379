//! Live device pass-through.
//!
//! The device writes one JSON frame per newline-terminated line. A line is
//! forwarded byte-for-byte (minus surrounding whitespace) once it parses as a
//! JSON object carrying the four sensor objects. Field values, extra keys and
//! the stage label are not interpreted. Lines that are not valid UTF-8, fail
//! that check, or exceed [`MAX_LINE_LENGTH`] are dropped.
//!
//! The channel is opened non-blocking, so a FIFO without a writer or a serial
//! node without carrier never stalls shutdown. Line settings such as the baud
//! rate are expected to be configured on the node before the bridge starts.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::{FrameSink, Producer, pace};
use crate::error::{Error, Result};
use crate::frame::EncodedFrame;

/// Back-off applied when the channel has no pending bytes.
pub const IDLE_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound for a single read attempt.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Longest line accepted from a device, terminator included.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Sections every forwarded line must carry as JSON objects.
const REQUIRED_SECTIONS: [&str; 4] = ["imu", "barometer1", "barometer2", "accelerometer"];

/// Counters for one pass over a device channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineStats {
    pub emitted: u64,
    pub discarded: u64,
}

/// Check one raw device line and return its wire form.
///
/// Returns `None` for anything that is not a frame-shaped JSON object.
pub fn decode_line(raw: &[u8]) -> Option<EncodedFrame> {
    let text = std::str::from_utf8(raw).ok()?.trim();
    if text.is_empty() {
        return None;
    }

    let object: Map<String, Value> = serde_json::from_str(text).ok()?;
    REQUIRED_SECTIONS
        .iter()
        .all(|section| object.get(*section).is_some_and(Value::is_object))
        .then(|| Arc::from(text))
}

/// Move the bytes up to and including the next newline into `line`.
///
/// Returns how many bytes were consumed and whether a terminator was seen.
/// Nothing is consumed until the underlying read completes, so the future
/// can be dropped at any await point without losing input.
async fn fill_line<R>(
    reader: &mut R,
    line: &mut Vec<u8>,
    keep: bool,
) -> io::Result<(usize, bool)>
where
    R: AsyncBufRead + Unpin,
{
    let available = reader.fill_buf().await?;
    let (used, complete) = match available.iter().position(|&b| b == b'\n') {
        Some(end) => (end + 1, true),
        None => (available.len(), false),
    };
    if keep {
        line.extend_from_slice(&available[..used]);
    }
    reader.consume(used);
    Ok((used, complete))
}

/// Forward frames from a line-oriented reader until cancelled.
///
/// End of input is treated as an idle channel, not as completion. Partial
/// lines are kept until their terminator arrives. A line that grows past
/// [`MAX_LINE_LENGTH`] is counted as discarded and skipped up to its
/// terminator.
pub async fn pump_lines<R>(
    mut reader: R,
    sink: &mut dyn FrameSink,
    cancel: &CancellationToken,
) -> Result<LineStats>
where
    R: AsyncBufRead + Unpin + Send,
{
    let mut stats = LineStats::default();
    let mut line = Vec::with_capacity(1024);
    let mut skipping = false;

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = tokio::time::timeout(
                READ_TIMEOUT,
                fill_line(&mut reader, &mut line, !skipping),
            ) => read,
        };

        let Ok(read) = read else {
            // Nothing arrived within the read timeout.
            continue;
        };
        let (n, complete) =
            read.map_err(|e| Error::interrupted(format!("device read failed: {e}")))?;
        if n == 0 {
            if !pace(cancel, IDLE_INTERVAL).await {
                break;
            }
            continue;
        }

        if !complete {
            if !skipping && line.len() > MAX_LINE_LENGTH {
                stats.discarded += 1;
                debug!(len = line.len(), "Discarding oversized device line");
                line.clear();
                line.shrink_to(1024);
                skipping = true;
            }
            continue;
        }
        if skipping {
            skipping = false;
            continue;
        }

        let decoded = if line.len() > MAX_LINE_LENGTH {
            None
        } else {
            decode_line(&line)
        };
        match decoded {
            Some(frame) => {
                stats.emitted += 1;
                sink.emit_encoded(frame).await;
            }
            None => {
                stats.discarded += 1;
                trace!(len = line.len(), "Discarding malformed device line");
            }
        }
        line.clear();
    }

    Ok(stats)
}

/// Open `path` for reading without waiting on a peer.
///
/// Regular files are read through the blocking pool, which never stalls on
/// them. Anything else (FIFOs, character devices) is opened non-blocking and
/// driven by the reactor.
async fn open_channel(path: &Path) -> io::Result<Box<dyn AsyncRead + Unpin + Send>> {
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.is_file() {
        return Ok(Box::new(tokio::fs::File::open(path).await?));
    }

    #[cfg(unix)]
    {
        let receiver = tokio::net::unix::pipe::OpenOptions::new()
            .unchecked(true)
            .open_receiver(path)?;
        Ok(Box::new(receiver))
    }

    #[cfg(not(unix))]
    {
        Ok(Box::new(tokio::fs::File::open(path).await?))
    }
}

/// Reads frames from a serial device or any other line-oriented channel.
#[derive(Debug)]
pub struct DeviceProducer {
    path: PathBuf,
}

impl DeviceProducer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Producer for DeviceProducer {
    fn name(&self) -> &'static str {
        "device"
    }

    async fn run(&mut self, sink: &mut dyn FrameSink, cancel: &CancellationToken) -> Result<()> {
        let channel = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            opened = open_channel(&self.path) => opened
                .map_err(|e| Error::source_unavailable(self.path.display().to_string(), e))?,
        };
        info!(device = %self.path.display(), "Opened telemetry device");

        let stats = pump_lines(BufReader::new(channel), sink, cancel).await?;
        debug!(
            emitted = stats.emitted,
            discarded = stats.discarded,
            "Device channel closed"
        );
        Ok(())
    }
}
