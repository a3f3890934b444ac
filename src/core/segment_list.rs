use crate::core::segment::Segment;
use std::collections::VecDeque;

/// Strict FIFO of owned segments, used both as the ready queue and the free pool.
///
/// Membership transfer is a move: a segment popped from one list is owned by
/// the caller until it is pushed onto another.
#[derive(Debug, Default)]
pub struct SegmentList {
    segments: VecDeque<Segment>,
}

impl SegmentList {
    pub fn new() -> Self {
        Self {
            segments: VecDeque::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            segments: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push_back(&mut self, segment: Segment) {
        self.segments.push_back(segment);
    }

    pub fn pop_front(&mut self) -> Option<Segment> {
        self.segments.pop_front()
    }

    pub fn front(&self) -> Option<&Segment> {
        self.segments.front()
    }

    /// Take every segment out, oldest first, leaving the list empty.
    pub fn drain_all(&mut self) -> impl Iterator<Item = Segment> + '_ {
        self.segments.drain(..)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_segment(sequence: u64) -> Segment {
        let mut segment = Segment::with_capacity(4);
        segment.stamp(sequence, 0);
        segment
    }

    #[test]
    fn fifo_order() {
        let mut list = SegmentList::new();
        for seq in 1..=3 {
            list.push_back(make_segment(seq));
        }
        assert_eq!(list.len(), 3);
        assert_eq!(list.front().map(|s| s.sequence()), Some(1));

        let order: Vec<u64> = std::iter::from_fn(|| list.pop_front())
            .map(|s| s.sequence())
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(list.is_empty());
        assert!(list.pop_front().is_none());
    }

    #[test]
    fn eviction_keeps_order_of_the_rest() {
        let mut list = SegmentList::with_capacity(3);
        for seq in 1..=3 {
            list.push_back(make_segment(seq));
        }
        let evicted = list.pop_front().unwrap();
        assert_eq!(evicted.sequence(), 1);
        list.push_back(make_segment(4));

        let order: Vec<u64> = list.iter().map(|s| s.sequence()).collect();
        assert_eq!(order, vec![2, 3, 4]);
    }

    #[test]
    fn drain_all_empties_the_list() {
        let mut list = SegmentList::new();
        list.push_back(make_segment(10));
        list.push_back(make_segment(11));

        let drained: Vec<u64> = list.drain_all().map(|s| s.sequence()).collect();
        assert_eq!(drained, vec![10, 11]);
        assert_eq!(list.len(), 0);
    }
}
