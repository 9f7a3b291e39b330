//! Wavefront path tracing over work queues.
//!
//! A frame runs as a sequence of passes over the queues owned by a
//! [`RenderContext`]. Each pass processes every queued item in parallel and
//! returns only once all of them are done, so passes never overlap:
//!
//! ```text
//! Generate -> [Extend -> Shade -> Shadow -> Compact]* until no rays remain
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use vela_core::TraceSettings;
use vela_math::{Interval, Ray, Vec3};

use crate::sampling::gen_f32;
use crate::stats::{FrameStats, PassStats, QueueOverflow};
use crate::{Camera, Color, Material, MaterialHit, RayState, RenderContext, Scene, ShadowRay};

/// Minimum hit distance for every traced ray, to step off the surface it
/// starts on.
pub const RAY_EPSILON: f32 = 1e-3;

/// One stage of the wavefront loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Camera rays for every pixel into the extend queue
    Generate,
    /// Closest-hit traversal; hits go to the shade queue
    Extend,
    /// Emission, light sampling and continuation rays
    Shade,
    /// Occlusion tests that gate light contributions
    Shadow,
    /// Retire consumed queues and swap the extend buffers
    Compact,
}

impl Pass {
    pub const COUNT: usize = 5;

    pub const ALL: [Pass; Pass::COUNT] = [
        Pass::Generate,
        Pass::Extend,
        Pass::Shade,
        Pass::Shadow,
        Pass::Compact,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Shared flag that stops a frame at the next pass boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear the flag so the next frame runs.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Survival test for a path with the given throughput.
///
/// `u` is uniform in `[0, 1)`. Survivors are reweighted by the survival
/// probability so the estimate stays unbiased.
pub fn russian_roulette(throughput: Color, u: f32) -> Option<Color> {
    let p = throughput.max_element().clamp(0.05, 1.0);
    (u < p).then(|| throughput / p)
}

/// Scatter a shaded path into its next ray, or end it.
fn continue_path(
    settings: &TraceSettings,
    state: &RayState,
    material: &Material,
    point: Vec3,
    normal: Vec3,
    rng: &mut SmallRng,
) -> Option<RayState> {
    let depth = state.depth + 1;
    if depth >= settings.max_bounce_depth {
        return None;
    }

    let (attenuation, direction) = material.scatter(state.ray.direction, normal, rng)?;
    let mut throughput = state.throughput * attenuation;
    if throughput.max_element() <= 0.0 {
        return None;
    }

    if depth >= settings.russian_roulette_start_depth {
        throughput = russian_roulette(throughput, gen_f32(rng))?;
    }

    Some(state.continue_with(Ray::new(point, direction), throughput, rng))
}

#[inline]
fn pushed<T>(result: Result<usize, T>, tally: &mut PassStats) {
    match result {
        Ok(_) => tally.produced += 1,
        Err(_) => tally.dropped += 1,
    }
}

/// Drives frames of a scene through a render context.
///
/// The context's accumulation buffer keeps summing across frames; each
/// completed frame bumps its frame count.
pub struct Scheduler<'a> {
    scene: &'a Scene,
    camera: &'a Camera,
    ctx: &'a mut RenderContext,
    settings: TraceSettings,
    cancel: CancelToken,
    frame: u32,
    overflow: QueueOverflow,
}

impl<'a> Scheduler<'a> {
    /// `camera` should cover the context's resolution.
    pub fn new(
        scene: &'a Scene,
        camera: &'a Camera,
        ctx: &'a mut RenderContext,
        settings: &TraceSettings,
    ) -> Self {
        if camera.width() != ctx.width() || camera.height() != ctx.height() {
            log::warn!(
                "Camera resolution {}x{} differs from render context {}x{}",
                camera.width(),
                camera.height(),
                ctx.width(),
                ctx.height()
            );
        }

        Self {
            scene,
            camera,
            ctx,
            settings: *settings,
            cancel: CancelToken::new(),
            frame: 0,
            overflow: QueueOverflow::default(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn context(&self) -> &RenderContext {
        self.ctx
    }

    /// Index of the next frame to render.
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Run a single pass to completion.
    pub fn run_pass(&mut self, pass: Pass) -> PassStats {
        let start = Instant::now();

        let mut stats = match pass {
            Pass::Generate => self.generate(),
            Pass::Extend => self.extend(),
            Pass::Shade => self.shade(),
            Pass::Shadow => self.shadow(),
            Pass::Compact => self.compact(),
        };

        stats.elapsed = start.elapsed();
        log::debug!("{:?}: {}", pass, stats);
        stats
    }

    /// Trace one sample per pixel until every path has ended.
    ///
    /// A cancelled frame does not count toward the accumulated frames, but
    /// whatever it already added stays in the buffer.
    pub fn render_frame(&mut self) -> FrameStats {
        let start = Instant::now();
        let mut frame = FrameStats::new(self.frame);

        self.ctx.reset_queues();
        self.overflow = QueueOverflow::default();

        let completed = self.run_passes(&mut frame);
        frame.overflow = self.overflow;
        frame.elapsed = start.elapsed();

        if completed {
            self.ctx.accumulation.finish_frame();
            self.frame += 1;
        } else {
            frame.cancelled = true;
            self.ctx.reset_queues();
        }

        if frame.overflow.total() > 0 {
            log::warn!(
                "Frame {}: queues overflowed (extend {}, shade {}, shadow {}), contributions were dropped",
                frame.frame,
                frame.overflow.extend,
                frame.overflow.shade,
                frame.overflow.shadow
            );
        }
        log::info!("{}", frame);

        frame
    }

    fn run_passes(&mut self, frame: &mut FrameStats) -> bool {
        if !self.step(Pass::Generate, frame) {
            return false;
        }

        while !self.ctx.extend_queue().is_empty() {
            for pass in [Pass::Extend, Pass::Shade, Pass::Shadow, Pass::Compact] {
                if !self.step(pass, frame) {
                    return false;
                }
            }
            frame.bounces += 1;
        }

        true
    }

    fn step(&mut self, pass: Pass, frame: &mut FrameStats) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        let stats = self.run_pass(pass);
        frame.record(pass, &stats);
        true
    }

    fn generate(&self) -> PassStats {
        let ctx = &*self.ctx;
        let camera = self.camera;
        let queue = ctx.extend_queue();
        let pixels = ctx.accumulation.pixel_count() as u32;
        let frame = self.frame as u64;

        (0..pixels)
            .into_par_iter()
            .map(|pixel| {
                let mut tally = PassStats {
                    input: 1,
                    ..Default::default()
                };

                let mut rng = SmallRng::seed_from_u64((frame << 32) | pixel as u64);
                let ray = camera.primary_ray(pixel, &mut rng);
                let state = RayState {
                    ray,
                    pixel,
                    throughput: Color::ONE,
                    depth: 0,
                    seed: rng.gen(),
                };

                pushed(queue.push(state), &mut tally);
                tally
            })
            .reduce(PassStats::default, PassStats::merge)
    }

    fn extend(&self) -> PassStats {
        let ctx = &*self.ctx;
        let scene = self.scene;
        let primitives = scene.primitives();
        let background = scene.background();

        ctx.extend_queue()
            .par_iter()
            .map(|state| {
                let mut tally = PassStats {
                    input: 1,
                    ..Default::default()
                };

                let hit = scene.bvh().intersect(
                    &state.ray,
                    Interval::from_min(RAY_EPSILON),
                    primitives,
                );

                match hit {
                    Some(hit) => {
                        let record = MaterialHit {
                            state: *state,
                            primitive: hit.primitive,
                            t: hit.t,
                            u: hit.u,
                            v: hit.v,
                        };
                        if ctx.shade.push(record).is_ok() {
                            tally.hits = 1;
                            tally.produced = 1;
                        } else {
                            tally.dropped = 1;
                        }
                    }
                    None => {
                        tally.misses = 1;
                        tally.terminated = 1;
                        if !state.ray.is_degenerate() {
                            ctx.accumulation
                                .add(state.pixel, state.throughput * background);
                        }
                    }
                }

                tally
            })
            .reduce(PassStats::default, PassStats::merge)
    }

    fn shade(&self) -> PassStats {
        let ctx = &*self.ctx;
        let scene = self.scene;
        let settings = &self.settings;
        let primitives = scene.primitives();
        let lights = scene.lights();
        let next = ctx.next_extend_queue();

        ctx.shade
            .par_iter()
            .map(|hit| {
                let mut tally = PassStats {
                    input: 1,
                    ..Default::default()
                };

                let state = &hit.state;
                let primitive = &primitives[hit.primitive as usize];
                let material = scene.material(primitive.material());
                let point = state.ray.at(hit.t);
                let mut rng = state.sampler();

                let mut normal = primitive.normal();
                if normal.dot(state.ray.direction) > 0.0 {
                    normal = -normal;
                }

                let emitted = material.emitted();
                if emitted != Color::ZERO {
                    ctx.accumulation.add(state.pixel, state.throughput * emitted);
                }

                if material.samples_lights() && !lights.is_empty() {
                    let light = &lights[rng.gen_range(0..lights.len())];
                    if let Some(sample) = light.sample(point) {
                        let cos = normal.dot(sample.direction);
                        if cos > 0.0 {
                            // One light out of `len`, so scale by the inverse pick probability
                            let contribution = state.throughput
                                * material.brdf()
                                * sample.radiance
                                * cos
                                * lights.len() as f32;
                            let shadow = ShadowRay {
                                ray: Ray::new(point, sample.direction),
                                t_max: sample.distance - RAY_EPSILON,
                                pixel: state.pixel,
                                contribution,
                            };
                            pushed(ctx.shadow.push(shadow), &mut tally);
                        }
                    }
                }

                match continue_path(settings, state, material, point, normal, &mut rng) {
                    Some(next_state) => pushed(next.push(next_state), &mut tally),
                    None => tally.terminated = 1,
                }

                tally
            })
            .reduce(PassStats::default, PassStats::merge)
    }

    fn shadow(&self) -> PassStats {
        let ctx = &*self.ctx;
        let scene = self.scene;
        let primitives = scene.primitives();

        ctx.shadow
            .par_iter()
            .map(|shadow| {
                let mut tally = PassStats {
                    input: 1,
                    ..Default::default()
                };

                let range = Interval::new(RAY_EPSILON, shadow.t_max);
                if scene.bvh().occluded(&shadow.ray, range, primitives) {
                    tally.occluded = 1;
                } else {
                    ctx.accumulation.add(shadow.pixel, shadow.contribution);
                }

                tally
            })
            .reduce(PassStats::default, PassStats::merge)
    }

    fn compact(&mut self) -> PassStats {
        let ctx = &mut *self.ctx;
        let current = ctx.current;

        let overflow = QueueOverflow {
            extend: ctx.extend[current].dropped(),
            shade: ctx.shade.dropped(),
            shadow: ctx.shadow.dropped(),
        };
        let input = ctx.extend[current].len();

        ctx.extend[current].reset();
        ctx.shade.reset();
        ctx.shadow.reset();
        ctx.current = 1 - current;

        self.overflow += overflow;

        PassStats {
            input,
            produced: ctx.extend[ctx.current].len(),
            dropped: overflow.total(),
            ..Default::default()
        }
    }
}
