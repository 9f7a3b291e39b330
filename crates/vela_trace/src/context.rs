//! Pre-allocated buffers for a render.

use std::collections::TryReserveError;

use thiserror::Error;
use vela_core::TraceSettings;

use crate::{AccumulationBuffer, MaterialHit, RayState, ShadowRay, WorkQueue};

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("could not allocate {capacity} slots for the {queue} pool: {source}")]
    PoolAllocation {
        queue: &'static str,
        capacity: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("the {queue} queue would have no slots")]
    EmptyPool { queue: &'static str },

    #[error("invalid resolution {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },
}

pub type ContextResult<T> = std::result::Result<T, ContextError>;

/// Owns the work queues and the accumulation buffer of one render.
///
/// Everything is allocated once here; the scheduler never allocates per ray.
/// On [`ContextError::PoolAllocation`] retry with a smaller resolution or
/// queue multiplier.
#[derive(Debug)]
pub struct RenderContext {
    pub(crate) extend: [WorkQueue<RayState>; 2],
    /// Index of the extend queue consumed by the next Extend pass
    pub(crate) current: usize,
    pub(crate) shade: WorkQueue<MaterialHit>,
    pub(crate) shadow: WorkQueue<ShadowRay>,
    pub(crate) accumulation: AccumulationBuffer,
}

impl RenderContext {
    /// Size every queue to the pixel count scaled by
    /// `queue_capacity_multiplier`.
    pub fn new(width: u32, height: u32, settings: &TraceSettings) -> ContextResult<Self> {
        let pixels = width as usize * height as usize;
        let capacity = (pixels as f64 * settings.queue_capacity_multiplier as f64).ceil() as usize;

        Self::with_capacities(width, height, capacity, capacity, capacity)
    }

    /// Explicit per-queue capacities.
    pub fn with_capacities(
        width: u32,
        height: u32,
        extend: usize,
        shade: usize,
        shadow: usize,
    ) -> ContextResult<Self> {
        if width == 0 || height == 0 {
            return Err(ContextError::InvalidResolution { width, height });
        }

        let ctx = Self {
            extend: [
                WorkQueue::with_capacity("extend", extend)?,
                WorkQueue::with_capacity("extend", extend)?,
            ],
            current: 0,
            shade: WorkQueue::with_capacity("shade", shade)?,
            shadow: WorkQueue::with_capacity("shadow", shadow)?,
            accumulation: AccumulationBuffer::new(width, height)?,
        };

        log::debug!(
            "Render context {}x{}: extend {} x2, shade {}, shadow {}",
            width,
            height,
            extend,
            shade,
            shadow
        );

        Ok(ctx)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.accumulation.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.accumulation.height()
    }

    pub fn accumulation(&self) -> &AccumulationBuffer {
        &self.accumulation
    }

    /// The extend queue the next Extend pass reads.
    pub fn extend_queue(&self) -> &WorkQueue<RayState> {
        &self.extend[self.current]
    }

    /// The extend queue the Shade pass fills with continuation rays.
    pub fn next_extend_queue(&self) -> &WorkQueue<RayState> {
        &self.extend[1 - self.current]
    }

    pub fn shade_queue(&self) -> &WorkQueue<MaterialHit> {
        &self.shade
    }

    pub fn shadow_queue(&self) -> &WorkQueue<ShadowRay> {
        &self.shadow
    }

    /// Empty every queue, e.g. after a cancelled frame.
    pub(crate) fn reset_queues(&mut self) {
        for queue in &mut self.extend {
            queue.reset();
        }
        self.shade.reset();
        self.shadow.reset();
        self.current = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacities_follow_multiplier() {
        let settings = TraceSettings {
            queue_capacity_multiplier: 1.5,
            ..Default::default()
        };
        let ctx = RenderContext::new(4, 3, &settings).unwrap();

        assert_eq!(ctx.extend_queue().capacity(), 18);
        assert_eq!(ctx.next_extend_queue().capacity(), 18);
        assert_eq!(ctx.shade_queue().capacity(), 18);
        assert_eq!(ctx.shadow_queue().capacity(), 18);
        assert_eq!(ctx.accumulation().pixel_count(), 12);
    }

    #[test]
    fn test_pool_allocation_failure_is_reported() {
        let err = RenderContext::with_capacities(4, 4, usize::MAX, 16, 16).unwrap_err();
        assert!(matches!(err, ContextError::PoolAllocation { queue: "extend", .. }));

        let err = RenderContext::with_capacities(4, 4, 16, 16, 0).unwrap_err();
        assert!(matches!(err, ContextError::EmptyPool { queue: "shadow" }));

        let err = RenderContext::with_capacities(u32::MAX, u32::MAX, 16, 16, 16).unwrap_err();
        assert!(matches!(err, ContextError::PoolAllocation { queue: "accumulation", .. }));

        let err = RenderContext::new(0, 4, &TraceSettings::default()).unwrap_err();
        assert!(matches!(err, ContextError::InvalidResolution { .. }));
    }
}
