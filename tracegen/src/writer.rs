use crate::{Error, Result};
use perfetto_format::{encode_packets, TracePacket};
use std::io::Write;
use tracing::debug;

pub const DEFAULT_FLUSH_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub packets_written: u64,
    pub bytes_written: u64,
    pub flushes: u64,
}

/// Pending batch of packets in front of the output sink. The batch is
/// written as one `Trace` container once it grows past the threshold or on
/// an explicit flush.
pub struct BufferedWriter {
    sink: Box<dyn Write + Send>,
    batch: Vec<TracePacket>,
    flush_threshold: usize,
    stats: WriterStats,
}

impl BufferedWriter {
    pub fn new(sink: Box<dyn Write + Send>, flush_threshold: usize) -> Self {
        Self {
            sink,
            batch: Vec::new(),
            flush_threshold,
            stats: WriterStats::default(),
        }
    }

    pub fn append(&mut self, packet: TracePacket) -> Result<()> {
        self.batch.push(packet);
        if self.batch.len() > self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes and clears the pending batch. On failure the batch is dropped
    /// and the error reports how many packets were lost.
    pub fn flush(&mut self) -> Result<()> {
        let packets = std::mem::take(&mut self.batch);
        let count = packets.len();
        if count > 0 {
            let buf = encode_packets(packets).map_err(|e| Error::SinkFailed {
                dropped: count as u64,
                source: std::io::Error::other(e),
            })?;
            self.sink
                .write_all(&buf)
                .map_err(|source| Error::SinkFailed {
                    dropped: count as u64,
                    source,
                })?;
            self.stats.packets_written += count as u64;
            self.stats.bytes_written += buf.len() as u64;
            self.stats.flushes += 1;
            debug!(packets = count, bytes = buf.len(), "flushed trace batch");
        }
        self.sink.flush().map_err(|source| Error::SinkFailed {
            dropped: 0,
            source,
        })
    }

    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    pub fn stats(&self) -> WriterStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{FailingSink, SharedBuffer};
    use perfetto_format::{clock_snapshot_packet, decode_trace};

    #[test]
    fn flushes_once_threshold_is_crossed() {
        let buffer = SharedBuffer::default();
        let mut writer = BufferedWriter::new(Box::new(buffer.clone()), 3);
        for _ in 0..3 {
            writer.append(clock_snapshot_packet()).unwrap();
        }
        assert_eq!(writer.pending(), 3);
        assert!(buffer.is_empty());

        writer.append(clock_snapshot_packet()).unwrap();
        assert_eq!(writer.pending(), 0);
        assert_eq!(decode_trace(&buffer.contents()).unwrap().packet.len(), 4);
        assert_eq!(writer.stats().flushes, 1);
    }

    #[test]
    fn empty_flush_writes_nothing() {
        let buffer = SharedBuffer::default();
        let mut writer = BufferedWriter::new(Box::new(buffer.clone()), 10);
        writer.flush().unwrap();
        assert!(buffer.is_empty());
        assert_eq!(writer.stats(), WriterStats::default());
    }

    #[test]
    fn failed_flush_reports_dropped_packets() {
        let mut writer = BufferedWriter::new(Box::new(FailingSink), 10);
        writer.append(clock_snapshot_packet()).unwrap();
        writer.append(clock_snapshot_packet()).unwrap();
        match writer.flush() {
            Err(Error::SinkFailed { dropped, .. }) => assert_eq!(dropped, 2),
            other => panic!("expected sink failure, got {:?}", other),
        }
        assert_eq!(writer.pending(), 0);
    }
}
