use std::collections::VecDeque;

/// Fixed-capacity FIFO that evicts its oldest entry on overflow.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `item`, returning the evicted entry if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + '_ {
        self.items.iter()
    }

    /// Iterates over the newest `count` entries, oldest first.
    pub fn tail(&self, count: usize) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + '_ {
        let skip = self.items.len().saturating_sub(count);
        self.items.range(skip..)
    }
}

impl RingBuffer<f64> {
    /// Mean of the newest `count` values, `None` when empty.
    pub fn tail_mean(&self, count: usize) -> Option<f64> {
        let tail = self.tail(count);
        let len = tail.len();
        if len == 0 {
            return None;
        }
        Some(tail.sum::<f64>() / len as f64)
    }

    /// Minimum and maximum over the newest `count` values.
    pub fn tail_range(&self, count: usize) -> Option<(f64, f64)> {
        self.tail(count).fold(None, |acc, &value| match acc {
            None => Some((value, value)),
            Some((min, max)) => Some((min.min(value), max.max(value))),
        })
    }

    pub fn mean(&self) -> Option<f64> {
        self.tail_mean(self.items.len())
    }

    /// Population standard deviation of the whole buffer.
    pub fn std_dev(&self) -> Option<f64> {
        let mean = self.mean()?;
        let variance = self
            .items
            .iter()
            .map(|value| (value - mean).powi(2))
            .sum::<f64>()
            / self.items.len() as f64;
        Some(variance.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_first() {
        let mut buffer = RingBuffer::new(3);
        assert_eq!(buffer.push(1.0), None);
        buffer.push(2.0);
        buffer.push(3.0);
        assert_eq!(buffer.push(4.0), Some(1.0));

        let values: Vec<f64> = buffer.iter().copied().collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert_eq!(buffer.len(), buffer.capacity());
    }

    #[test]
    fn tail_statistics_cover_newest_values() {
        let mut buffer = RingBuffer::new(8);
        for value in [5.0, 1.0, 2.0, 3.0] {
            buffer.push(value);
        }

        assert_eq!(buffer.tail_mean(2), Some(2.5));
        assert_eq!(buffer.tail_range(3), Some((1.0, 3.0)));
        assert_eq!(buffer.tail_range(10), Some((1.0, 5.0)));
        assert_eq!(buffer.tail(2).copied().collect::<Vec<_>>(), vec![2.0, 3.0]);
    }

    #[test]
    fn empty_buffer_has_no_statistics() {
        let buffer: RingBuffer<f64> = RingBuffer::new(4);
        assert_eq!(buffer.mean(), None);
        assert_eq!(buffer.std_dev(), None);
        assert_eq!(buffer.tail_range(4), None);
    }
}
