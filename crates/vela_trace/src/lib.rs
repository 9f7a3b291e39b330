//! Vela Trace - wavefront path tracing on a wide BVH.
//!
//! Rays move through fixed-capacity work queues in barriered passes
//! (Generate, Extend, Shade, Shadow, Compact) instead of being traced one
//! path at a time. All queue memory is allocated up front by a
//! [`RenderContext`]; a full queue drops work and reports it rather than
//! growing.
//!
//! # Example
//!
//! ```ignore
//! use vela_trace::{Camera, RenderContext, Scene, Scheduler};
//!
//! let scene = Scene::new(store, materials, lights, background, &settings.build(), None);
//! let mut ctx = RenderContext::new(width, height, &settings.trace())?;
//! let mut scheduler = Scheduler::new(&scene, &camera, &mut ctx, &settings.trace());
//! let stats = scheduler.render_frame();
//! ```

mod accumulation;
mod camera;
mod context;
mod light;
mod material;
mod queue;
mod ray_state;
mod sampling;
mod scene;
pub mod scheduler;
pub mod stats;

pub use accumulation::{color_to_rgba, linear_to_gamma, AccumulationBuffer};
pub use camera::Camera;
pub use context::{ContextError, ContextResult, RenderContext};
pub use light::{Light, LightSample};
pub use material::{reflect, Color, Material};
pub use queue::WorkQueue;
pub use ray_state::{MaterialHit, RayState, ShadowRay};
pub use scene::Scene;
pub use scheduler::{russian_roulette, CancelToken, Pass, Scheduler, RAY_EPSILON};
pub use stats::{FrameStats, PassStats, QueueOverflow};

/// Re-export common math types from vela_math
pub use vela_math::{Ray, Vec3};
