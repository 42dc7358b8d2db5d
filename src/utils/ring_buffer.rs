/// A fixed-length circular buffer indexed by an ever-increasing absolute day counter.
///
/// Used by the vector-transmission model to hold the `Nv`/`Ov`/`Sv` histories, which only ever
/// need to look back `len` days from the current day.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RingBuffer {
    values: Vec<f64>,
}

impl RingBuffer {
    #[must_use]
    pub fn new(len: usize, initial: f64) -> Self {
        assert!(len > 0, "ring buffer length must be positive");
        RingBuffer {
            values: vec![initial; len],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn index(&self, day: i64) -> usize {
        let len = self.values.len() as i64;
        (((day % len) + len) % len) as usize
    }

    #[must_use]
    pub fn get(&self, day: i64) -> f64 {
        self.values[self.index(day)]
    }

    pub fn set(&mut self, day: i64, value: f64) {
        let idx = self.index(day);
        self.values[idx] = value;
    }
}

#[cfg(test)]
mod test {
    use super::RingBuffer;

    #[test]
    fn test_wraps_negative_and_positive() {
        let mut buf = RingBuffer::new(5, 0.0);
        buf.set(0, 1.0);
        buf.set(5, 2.0);
        buf.set(-5, 3.0);
        assert_eq!(buf.get(0), 3.0);
        assert_eq!(buf.get(5), 3.0);
        assert_eq!(buf.get(10), 3.0);
        assert_eq!(buf.get(-5), 3.0);
    }

    #[test]
    fn test_independent_slots() {
        let mut buf = RingBuffer::new(3, 0.0);
        buf.set(0, 1.0);
        buf.set(1, 2.0);
        buf.set(2, 3.0);
        assert_eq!(buf.get(0), 1.0);
        assert_eq!(buf.get(1), 2.0);
        assert_eq!(buf.get(2), 3.0);
    }
}
