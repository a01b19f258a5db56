/// Repaint regions accumulated between UI flushes.

use super::levels::LoadLevels;

/// Axis-aligned pixel rectangle. Zero width or height means empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const ZERO: Rect = Rect { x: 0, y: 0, width: 0, height: 0 };

    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle covering a whole buffer
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(
            0,
            0,
            i32::try_from(width).unwrap_or(i32::MAX),
            i32::try_from(height).unwrap_or(i32::MAX),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Smallest rectangle containing both. An empty side is ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }

        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        // Edges past i32::MAX clamp instead of wrapping
        let right = self.x.saturating_add(self.width).max(other.x.saturating_add(other.width));
        let bottom = self.y.saturating_add(self.height).max(other.y.saturating_add(other.height));

        Rect::new(left, top, right.saturating_sub(left), bottom.saturating_sub(top))
    }
}

/// Pending damage, one rectangle per fidelity level.
#[derive(Debug, Default)]
pub(crate) struct DamageAccumulator {
    pending: [Rect; 3],
}

impl DamageAccumulator {
    /// Merge `area` into the level's pending region.
    /// Returns true when the region was empty, i.e. a flush must be scheduled.
    pub fn add(&mut self, level: LoadLevels, area: Rect) -> bool {
        let Some(slot) = level.index() else {
            return false;
        };
        let was_empty = self.pending[slot].is_empty();
        self.pending[slot] = self.pending[slot].union(&area);
        was_empty && !self.pending[slot].is_empty()
    }

    /// Take and clear the level's pending region
    pub fn take(&mut self, level: LoadLevels) -> Rect {
        match level.index() {
            Some(slot) => std::mem::take(&mut self.pending[slot]),
            None => Rect::ZERO,
        }
    }

    /// Forget the level's pending region (a new buffer replaces whatever was damaged)
    pub fn reset(&mut self, level: LoadLevels) {
        if let Some(slot) = level.index() {
            self.pending[slot] = Rect::ZERO;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_of_overlapping() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.union(&b), Rect::new(0, 0, 15, 15));
        assert_eq!(b.union(&a), Rect::new(0, 0, 15, 15));
    }

    #[test]
    fn test_union_with_empty_is_identity() {
        let a = Rect::new(3, 4, 5, 6);
        assert_eq!(a.union(&Rect::ZERO), a);
        assert_eq!(Rect::ZERO.union(&a), a);
        assert!(Rect::ZERO.union(&Rect::ZERO).is_empty());
    }

    #[test]
    fn test_union_of_disjoint() {
        let a = Rect::new(0, 0, 2, 2);
        let b = Rect::new(10, 20, 5, 5);
        assert_eq!(a.union(&b), Rect::new(0, 0, 15, 25));
    }

    #[test]
    fn test_union_clamps_at_i32_max() {
        let far = Rect::new(i32::MAX - 5, 0, 10, 10);
        assert_eq!(far.union(&Rect::new(0, 0, 1, 1)), Rect::new(0, 0, i32::MAX, 10));

        let wide = Rect::new(-10, 0, 5, 5).union(&Rect::new(i32::MAX - 1, 0, 5, 5));
        assert_eq!(wide, Rect::new(-10, 0, i32::MAX, 5));
    }

    #[test]
    fn test_accumulator_requests_one_flush() {
        let mut damage = DamageAccumulator::default();

        assert!(damage.add(LoadLevels::LARGE, Rect::new(0, 0, 10, 10)));
        assert!(!damage.add(LoadLevels::LARGE, Rect::new(5, 5, 10, 10)));
        // Levels are tracked separately
        assert!(damage.add(LoadLevels::FULL, Rect::new(0, 0, 1, 1)));

        assert_eq!(damage.take(LoadLevels::LARGE), Rect::new(0, 0, 15, 15));
        assert!(damage.take(LoadLevels::LARGE).is_empty());

        // After a take the next update schedules again
        assert!(damage.add(LoadLevels::LARGE, Rect::new(1, 1, 1, 1)));
    }

    #[test]
    fn test_accumulator_reset() {
        let mut damage = DamageAccumulator::default();
        damage.add(LoadLevels::THUMBNAIL, Rect::new(0, 0, 4, 4));
        damage.reset(LoadLevels::THUMBNAIL);
        assert!(damage.take(LoadLevels::THUMBNAIL).is_empty());
    }
}
