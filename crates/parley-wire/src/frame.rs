//! Splitting the raw streaming body into discrete records.

/// Delimiter between records on the wire.
pub const RECORD_DELIMITER: &[u8] = b"\n\n";

/// Reassembles records from byte fragments arriving at arbitrary
/// boundaries.
///
/// One fragment may carry zero, one, or several complete records, and may
/// end in the middle of one. The decoder keeps a single pending buffer
/// across calls: each fragment is appended, every delimiter-terminated
/// segment is emitted in order, and the dangling tail is retained for the
/// next fragment. A record is never emitted before its delimiter has been
/// seen.
///
/// Buffering bytes rather than text means a multi-byte UTF-8 sequence
/// split across two fragments reassembles before the record is decoded.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment and collect every record it completes, in order.
    pub fn push(&mut self, fragment: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(fragment);

        let mut records = Vec::new();
        let mut start = 0;
        while let Some(pos) = find_delimiter(&self.pending[start..]) {
            let end = start + pos;
            records.push(String::from_utf8_lossy(&self.pending[start..end]).into_owned());
            start = end + RECORD_DELIMITER.len();
        }
        if start > 0 {
            self.pending.drain(..start);
        }
        records
    }

    /// Consume the decoder, surfacing the trailing bytes of an interrupted
    /// stream. They never form a record; the caller logs and discards them.
    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).into_owned())
        }
    }

    /// Whether a partial record is currently buffered.
    pub fn has_partial(&self) -> bool {
        !self.pending.is_empty()
    }
}

fn find_delimiter(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(RECORD_DELIMITER.len())
        .position(|w| w == RECORD_DELIMITER)
}
