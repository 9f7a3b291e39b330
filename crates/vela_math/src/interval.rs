/// Ray parameter range `[min, max]` a hit must fall in.
///
/// Traversal narrows `max` to the closest hit found so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f32,
    pub max: f32,
}

impl Interval {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Everything from `min` to infinity.
    pub fn from_min(min: f32) -> Self {
        Self::new(min, f32::INFINITY)
    }

    /// Inclusive at both ends.
    #[inline]
    pub fn contains(&self, t: f32) -> bool {
        self.min <= t && t <= self.max
    }
}
