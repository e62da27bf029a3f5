use bytes::{Bytes, BytesMut};

/// Splits a compressed byte stream into chunks at frame boundaries.
///
/// Bytes accumulate in a pending buffer. Once a frame marker appears past
/// `threshold` bytes, everything before the marker is sealed and the pending
/// buffer restarts with the marker.
#[derive(Debug)]
pub struct FrameChunker {
    marker: [u8; 2],
    threshold: usize,
    pending: BytesMut,
}

impl FrameChunker {
    pub fn new(marker: [u8; 2], threshold: usize) -> Self {
        Self {
            marker,
            threshold,
            pending: BytesMut::new(),
        }
    }

    /// Bytes waiting for the next frame boundary.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed bytes read from the encoder; returns any chunks sealed as a result.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        // A marker may straddle the previous read.
        let mut search_from = self.pending.len().saturating_sub(self.marker.len() - 1);
        self.pending.extend_from_slice(data);

        let mut sealed = Vec::new();
        while let Some(position) = self.find_marker(search_from) {
            sealed.push(self.pending.split_to(position).freeze());
            search_from = 0;
        }
        sealed
    }

    /// Seal whatever is pending once the encoder has finished.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.split().freeze())
        }
    }

    fn find_marker(&self, search_from: usize) -> Option<usize> {
        let from = search_from.max(self.threshold + 1);
        if from >= self.pending.len() {
            return None;
        }
        self.pending[from..]
            .windows(self.marker.len())
            .position(|window| window == self.marker)
            .map(|offset| from + offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: [u8; 2] = [0xFF, 0xFB];

    fn frame(len: usize) -> Vec<u8> {
        let mut frame = vec![0x11; len];
        frame[..2].copy_from_slice(&MARKER);
        frame
    }

    #[test]
    fn seals_at_marker_past_threshold() {
        let mut chunker = FrameChunker::new(MARKER, 10);
        assert!(chunker.push(&frame(8)).is_empty());
        assert!(chunker.push(&frame(8)).is_empty());
        let sealed = chunker.push(&frame(8));
        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].len(), 16);
        assert_eq!(&sealed[0][..2], &MARKER);
        assert_eq!(chunker.pending_len(), 8);
    }

    #[test]
    fn finds_marker_split_across_reads() {
        let mut chunker = FrameChunker::new(MARKER, 4);
        let mut data = frame(8);
        data.push(0xFF);
        assert!(chunker.push(&data).is_empty());
        let sealed = chunker.push(&[0xFB, 0x00, 0x00]);
        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].len(), 8);
        assert_eq!(chunker.finish().unwrap().as_ref(), &[0xFF, 0xFB, 0x00, 0x00]);
    }

    #[test]
    fn ignores_markers_below_threshold() {
        let mut chunker = FrameChunker::new(MARKER, 100);
        for _ in 0..10 {
            assert!(chunker.push(&frame(10)).is_empty());
        }
        assert_eq!(chunker.pending_len(), 100);
        assert_eq!(chunker.push(&frame(10)).len(), 0);
        let sealed = chunker.push(&frame(10));
        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].len(), 110);
    }

    #[test]
    fn every_chunk_starts_on_a_frame() {
        let mut chunker = FrameChunker::new(MARKER, 32);
        let stream: Vec<u8> = (0..50).flat_map(|_| frame(13)).collect();
        let mut chunks = Vec::new();
        for read in stream.chunks(7) {
            chunks.extend(chunker.push(read));
        }
        chunks.extend(chunker.finish());
        assert!(chunks.len() > 5);
        assert!(chunks.iter().all(|chunk| chunk.starts_with(&MARKER)));
        assert_eq!(chunks.iter().map(Bytes::len).sum::<usize>(), stream.len());
    }
}
