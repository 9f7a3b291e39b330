//! Counters reported by scheduler passes and frames.

use std::fmt;
use std::ops::AddAssign;
use std::time::Duration;

use crate::scheduler::Pass;

/// What a single pass did.
///
/// Every item a pass reads is accounted for exactly once: for Extend,
/// `input == hits + misses + dropped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Items read from the pass's input queue
    pub input: usize,
    pub hits: usize,
    pub misses: usize,
    /// Items written to downstream queues
    pub produced: usize,
    /// Items a full downstream queue refused
    pub dropped: usize,
    pub occluded: usize,
    /// Paths that ended in this pass
    pub terminated: usize,
    pub elapsed: Duration,
}

impl AddAssign for PassStats {
    fn add_assign(&mut self, other: Self) {
        self.input += other.input;
        self.hits += other.hits;
        self.misses += other.misses;
        self.produced += other.produced;
        self.dropped += other.dropped;
        self.occluded += other.occluded;
        self.terminated += other.terminated;
        self.elapsed += other.elapsed;
    }
}

impl PassStats {
    /// Combine per-item tallies from a parallel reduction.
    pub fn merge(mut self, other: Self) -> Self {
        self += other;
        self
    }
}

impl fmt::Display for PassStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in, {} hits, {} misses, {} produced, {} dropped, {} occluded, {} terminated ({:.2?})",
            self.input,
            self.hits,
            self.misses,
            self.produced,
            self.dropped,
            self.occluded,
            self.terminated,
            self.elapsed
        )
    }
}

/// Pushes refused because a queue was full, per queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOverflow {
    pub extend: usize,
    pub shade: usize,
    pub shadow: usize,
}

impl QueueOverflow {
    pub fn total(&self) -> usize {
        self.extend + self.shade + self.shadow
    }
}

impl AddAssign for QueueOverflow {
    fn add_assign(&mut self, other: Self) {
        self.extend += other.extend;
        self.shade += other.shade;
        self.shadow += other.shadow;
    }
}

/// Totals for one rendered frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    pub frame: u32,
    /// Extend/Shade/Shadow/Compact rounds run
    pub bounces: u32,
    pub generated: usize,
    pub hits: usize,
    pub misses: usize,
    pub shadow_rays: usize,
    pub occluded: usize,
    pub terminated: usize,
    pub overflow: QueueOverflow,
    /// Time spent in each pass, indexed by [`Pass::index`]
    pub pass_time: [Duration; Pass::COUNT],
    pub elapsed: Duration,
    /// The frame stopped early and was not added to the frame count
    pub cancelled: bool,
}

impl FrameStats {
    pub fn new(frame: u32) -> Self {
        Self {
            frame,
            ..Default::default()
        }
    }

    /// Fold the result of one pass into the frame totals.
    pub fn record(&mut self, pass: Pass, stats: &PassStats) {
        match pass {
            Pass::Generate => self.generated += stats.produced,
            Pass::Extend => {
                self.hits += stats.hits;
                self.misses += stats.misses;
            }
            Pass::Shadow => {
                self.shadow_rays += stats.input;
                self.occluded += stats.occluded;
            }
            Pass::Shade | Pass::Compact => {}
        }
        self.terminated += stats.terminated;
        self.pass_time[pass.index()] += stats.elapsed;
    }
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame {}: {} rays, {} bounces, {} hits, {} misses, {} shadow rays ({} occluded), {} overflowed in {:.2?}",
            self.frame,
            self.generated,
            self.bounces,
            self.hits,
            self.misses,
            self.shadow_rays,
            self.occluded,
            self.overflow.total(),
            self.elapsed
        )?;
        if self.cancelled {
            write!(f, " [cancelled]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_routes_counts() {
        let mut frame = FrameStats::new(2);

        frame.record(
            Pass::Extend,
            &PassStats {
                input: 10,
                hits: 6,
                misses: 3,
                dropped: 1,
                elapsed: Duration::from_millis(4),
                ..Default::default()
            },
        );
        frame.record(
            Pass::Shadow,
            &PassStats {
                input: 5,
                occluded: 2,
                elapsed: Duration::from_millis(1),
                ..Default::default()
            },
        );
        frame.record(
            Pass::Extend,
            &PassStats {
                input: 4,
                hits: 4,
                elapsed: Duration::from_millis(2),
                ..Default::default()
            },
        );

        assert_eq!(frame.hits, 10);
        assert_eq!(frame.misses, 3);
        assert_eq!(frame.shadow_rays, 5);
        assert_eq!(frame.occluded, 2);
        assert_eq!(frame.pass_time[Pass::Extend.index()], Duration::from_millis(6));
        assert_eq!(frame.pass_time[Pass::Shadow.index()], Duration::from_millis(1));
    }

    #[test]
    fn test_merge() {
        let a = PassStats {
            input: 1,
            hits: 1,
            ..Default::default()
        };
        let b = PassStats {
            input: 1,
            misses: 1,
            ..Default::default()
        };

        let sum = a.merge(b);
        assert_eq!(sum.input, 2);
        assert_eq!(sum.hits + sum.misses, 2);

        let overflow = QueueOverflow {
            extend: 1,
            shade: 0,
            shadow: 2,
        };
        assert_eq!(overflow.total(), 3);
    }
}
