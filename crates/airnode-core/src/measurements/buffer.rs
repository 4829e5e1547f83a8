//! Fixed-capacity circular buffer for one measured variable.

use alloc::vec::Vec;

use super::AllocationError;

/// Rolling window of the last `N` samples of a single variable.
///
/// The buffer is "full" from the moment it is allocated: every slot starts
/// at `0.0` and is overwritten in order. [`mean`](Self::mean) therefore
/// averages over all `N` slots, including slots that have never been
/// written, until the window has wrapped once.
#[derive(Debug, Clone)]
pub struct MeasurementBuffer {
    slots: Vec<f32>,
    cursor: usize,
}

impl MeasurementBuffer {
    /// Allocate a buffer with `capacity` zeroed slots.
    ///
    /// Fails if `capacity` is zero or the backing storage cannot be reserved.
    pub fn with_capacity(capacity: usize) -> Result<Self, AllocationError> {
        if capacity == 0 {
            return Err(AllocationError::ZeroCapacity);
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| AllocationError::OutOfMemory { requested: capacity })?;
        slots.resize(capacity, 0.0);

        Ok(Self { slots, cursor: 0 })
    }

    /// Write `value` over the oldest slot and advance the cursor.
    pub fn push(&mut self, value: f32) {
        self.slots[self.cursor] = value;
        self.cursor = (self.cursor + 1) % self.slots.len();
    }

    /// Arithmetic mean over every slot.
    pub fn mean(&self) -> f32 {
        let sum: f32 = self.slots.iter().sum();
        sum / self.slots.len() as f32
    }

    /// The most recently written slot (slot 0 before the first push).
    pub fn latest(&self) -> f32 {
        let len = self.slots.len();
        self.slots[(self.cursor + len - 1) % len]
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Index of the slot the next [`push`](Self::push) will overwrite.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot_mean(buffer: &MeasurementBuffer) -> f32 {
        buffer.as_slice().iter().sum::<f32>() / buffer.capacity() as f32
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(
            MeasurementBuffer::with_capacity(0).unwrap_err(),
            AllocationError::ZeroCapacity
        );
    }

    #[test]
    fn test_new_buffer_is_zeroed() {
        let buffer = MeasurementBuffer::with_capacity(4).unwrap();
        assert_eq!(buffer.as_slice(), &[0.0; 4]);
        assert_eq!(buffer.mean(), 0.0);
        assert_eq!(buffer.cursor(), 0);
    }

    #[test]
    fn test_latest_tracks_last_push() {
        for capacity in [1, 3, 10] {
            let mut buffer = MeasurementBuffer::with_capacity(capacity).unwrap();
            for i in 0..(capacity * 3 + 1) {
                let value = i as f32 * 1.5 - 4.0;
                buffer.push(value);
                assert_eq!(buffer.latest(), value, "capacity {capacity}, push {i}");
                assert!(buffer.cursor() < capacity);
            }
        }
    }

    #[test]
    fn test_mean_includes_unwritten_slots() {
        let mut buffer = MeasurementBuffer::with_capacity(10).unwrap();
        buffer.push(10.0);
        buffer.push(20.0);

        // Eight slots are still zero.
        assert_eq!(buffer.mean(), 3.0);
    }

    #[test]
    fn test_mean_matches_backing_slots() {
        for capacity in [1, 3, 10] {
            let mut buffer = MeasurementBuffer::with_capacity(capacity).unwrap();
            for i in 0..25 {
                buffer.push((i * 7 % 11) as f32);
                assert_eq!(buffer.mean(), slot_mean(&buffer));
            }
        }
    }

    #[test]
    fn test_overwrites_oldest() {
        let mut buffer = MeasurementBuffer::with_capacity(3).unwrap();
        for value in [1.0, 2.0, 3.0, 4.0] {
            buffer.push(value);
        }

        assert_eq!(buffer.as_slice(), &[4.0, 2.0, 3.0]);
        assert_eq!(buffer.latest(), 4.0);
        assert_eq!(buffer.mean(), 3.0);
    }

    #[test]
    fn test_repeated_value_converges() {
        for capacity in [1, 3, 10] {
            let mut buffer = MeasurementBuffer::with_capacity(capacity).unwrap();
            buffer.push(99.0);
            for _ in 0..capacity {
                buffer.push(21.5);
            }
            assert_eq!(buffer.mean(), 21.5);
        }
    }
}
