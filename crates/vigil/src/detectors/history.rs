/// A fixed-length ring of the most recent samples.
#[derive(Debug, Clone)]
pub struct History<T, const N: usize> {
    slots: [T; N],
    next: usize,
    len: usize,
}

impl<T: Copy + Default, const N: usize> Default for History<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default, const N: usize> History<T, N> {
    /// Creates an empty [`History`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: [T::default(); N],
            next: 0,
            len: 0,
        }
    }

    /// Stores a sample, overwriting the oldest one when full.
    pub fn push(&mut self, sample: T) {
        self.slots[self.next] = sample;
        self.next = (self.next + 1) % N;
        self.len = (self.len + 1).min(N);
    }
}

impl<T, const N: usize> History<T, N> {
    /// Number of stored samples.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether no sample is stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the history holds `N` samples.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len == N
    }

    /// Forgets every sample.
    pub fn clear(&mut self) {
        self.next = 0;
        self.len = 0;
    }

    /// Iterates over the stored samples in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots[..self.len].iter()
    }
}

impl<const N: usize> History<f32, N> {
    /// Mean of the samples, available only once the history is full.
    #[must_use]
    pub fn mean(&self) -> Option<f32> {
        if !self.is_full() {
            return None;
        }
        Some(self.iter().sum::<f32>() / N as f32)
    }
}

impl<const N: usize, const A: usize> History<[f32; A], N> {
    /// Per-axis mean of the samples, available only once the history is
    /// full.
    #[must_use]
    pub fn mean(&self) -> Option<[f32; A]> {
        if !self.is_full() {
            return None;
        }
        let mut mean = [0.0; A];
        for sample in self.iter() {
            for (total, value) in mean.iter_mut().zip(sample) {
                *total += value;
            }
        }
        for total in &mut mean {
            *total /= N as f32;
        }
        Some(mean)
    }
}

/// A shift register of deviation bits.
///
/// Each sample shifts one bit in; an anomaly is sustained when the last
/// `run` bits are all set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debounce {
    bits: u32,
    mask: u32,
}

impl Debounce {
    /// Creates a [`Debounce`] that needs `run` consecutive set bits.
    ///
    /// `run` is clamped to `1..=32`.
    #[must_use]
    pub const fn new(run: u8) -> Self {
        let mask = match run {
            0 | 1 => 1,
            32.. => u32::MAX,
            run => (1 << run) - 1,
        };
        Self { bits: 0, mask }
    }

    /// Shifts in a set bit and tells whether the run is now complete.
    #[must_use]
    pub const fn deviate(&mut self) -> bool {
        self.bits = (self.bits << 1) | 1;
        self.bits & self.mask == self.mask
    }

    /// Shifts in a clear bit.
    pub const fn settle(&mut self) {
        self.bits <<= 1;
    }

    /// Clears every bit.
    pub const fn clear(&mut self) {
        self.bits = 0;
    }

    /// Returns the raw register.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.bits
    }
}
