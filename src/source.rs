use std::iter::FusedIterator;

use crate::models::WorkUnit;

/// Yields the work units `0..count` in id order, each exactly once.
#[derive(Debug, Clone)]
pub struct WorkUnits {
    next: usize,
    count: usize,
}

impl WorkUnits {
    pub fn new(count: usize) -> Self {
        Self { next: 0, count }
    }

    /// Units not yet handed out.
    pub fn remaining(&self) -> usize {
        self.count - self.next
    }

    pub fn is_exhausted(&self) -> bool {
        self.next >= self.count
    }
}

impl Iterator for WorkUnits {
    type Item = WorkUnit;

    fn next(&mut self) -> Option<WorkUnit> {
        if self.next >= self.count {
            return None;
        }
        let unit = WorkUnit::new(self.next);
        self.next += 1;
        Some(unit)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for WorkUnits {}
impl FusedIterator for WorkUnits {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yields_each_id_once() {
        let ids: Vec<usize> = WorkUnits::new(4).map(|unit| unit.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_remaining_tracks_consumption() {
        let mut units = WorkUnits::new(2);
        assert_eq!(units.len(), 2);
        units.next();
        assert_eq!(units.remaining(), 1);
        units.next();
        assert!(units.is_exhausted());
        assert_eq!(units.next(), None);
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(WorkUnits::new(0).count(), 0);
    }
}
