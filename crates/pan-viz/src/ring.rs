//! History ring arena
//!
//! Fixed-capacity circular sequence of rows, each carrying the center
//! frequency it was recorded at. Rows are preallocated once; a write cursor
//! advances modulo capacity and the oldest row is overwritten. Payload type
//! varies by backend: raw `f32` magnitudes, quantized `u8`, or RGBA `u8`.

pub struct HistoryRing<T: Copy + Default> {
    rows: Vec<Vec<T>>,
    freqs: Vec<f64>,
    width: usize,
    cursor: usize,
    len: usize,
}

impl<T: Copy + Default> HistoryRing<T> {
    pub fn new(capacity: usize, width: usize) -> Self {
        assert!(capacity > 0, "history ring needs at least one slot");
        Self {
            rows: vec![vec![T::default(); width]; capacity],
            freqs: vec![0.0; capacity],
            width,
            cursor: 0,
            len: 0,
        }
    }

    /// Write one row at the cursor slot, overwriting whatever was there, and
    /// advance. Returns the slot index that was written.
    pub fn push(&mut self, data: &[T], center_freq: f64) -> usize {
        debug_assert_eq!(data.len(), self.width);
        let slot = self.cursor;
        self.rows[slot].copy_from_slice(data);
        self.freqs[slot] = center_freq;
        self.cursor = (self.cursor + 1) % self.capacity();
        self.len = (self.len + 1).min(self.capacity());
        slot
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows holding real data, saturating at capacity.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Next slot to be written.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn row(&self, slot: usize) -> (&[T], f64) {
        (&self.rows[slot], self.freqs[slot])
    }

    /// Retained rows, newest first.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = (&[T], f64)> {
        let capacity = self.capacity();
        (1..=self.len).map(move |age| {
            let slot = (self.cursor + capacity - age) % capacity;
            (self.rows[slot].as_slice(), self.freqs[slot])
        })
    }

    /// Retained rows, oldest first (full re-upload after context restore).
    pub fn iter_oldest_first(&self) -> impl Iterator<Item = (usize, &[T], f64)> {
        let capacity = self.capacity();
        (0..self.len).rev().map(move |age| {
            let slot = (self.cursor + capacity - 1 - age) % capacity;
            (slot, self.rows[slot].as_slice(), self.freqs[slot])
        })
    }

    /// Discard all history and reallocate rows at a new width. Used when the
    /// incoming bin count changes; accumulated history is lost by design.
    pub fn reset(&mut self, width: usize) {
        if width != self.width {
            for row in &mut self.rows {
                *row = vec![T::default(); width];
            }
            self.width = width;
        }
        self.cursor = 0;
        self.len = 0;
    }

    /// Forget contents without reallocating.
    pub fn clear(&mut self) {
        self.cursor = 0;
        self.len = 0;
    }
}
