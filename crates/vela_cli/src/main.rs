//! Render the built-in Cornell box with the wavefront tracer.
//!
//! ```text
//! vela [--config vela.json] [--output out.png] [--width 512] [--height 512] [--frames 16]
//! ```

mod cornell;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use image::RgbaImage;
use vela_bvh::BvhCache;
use vela_core::{PrimitiveStore, Settings};
use vela_trace::{Color, RenderContext, Scene, Scheduler};

const USAGE: &str =
    "usage: vela [--config <file.json>] [--output <file.png>] [--width N] [--height N] [--frames N]";

#[derive(Debug, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    output: PathBuf,
    width: u32,
    height: u32,
    frames: u32,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: None,
            output: PathBuf::from("vela.png"),
            width: 512,
            height: 512,
            frames: 16,
        }
    }
}

impl Args {
    /// Parse the arguments after the program name. `Ok(None)` means help
    /// was requested.
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Option<Self>> {
        let mut parsed = Args::default();
        let mut args = args.into_iter();

        while let Some(flag) = args.next() {
            if flag == "-h" || flag == "--help" {
                return Ok(None);
            }

            let Some(value) = args.next() else {
                bail!("missing value for {flag}\n{USAGE}");
            };
            let number = |value: &str| -> Result<u32> {
                value
                    .parse()
                    .with_context(|| format!("invalid value for {flag}: {value}"))
            };

            match flag.as_str() {
                "--config" => parsed.config = Some(PathBuf::from(value)),
                "--output" | "-o" => parsed.output = PathBuf::from(value),
                "--width" => parsed.width = number(&value)?,
                "--height" => parsed.height = number(&value)?,
                "--frames" => parsed.frames = number(&value)?,
                _ => bail!("unknown argument {flag}\n{USAGE}"),
            }
        }

        if parsed.width == 0 || parsed.height == 0 {
            bail!("resolution must be non-zero");
        }

        Ok(Some(parsed))
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let Some(args) = Args::parse(std::env::args().skip(1))? else {
        println!("{USAGE}");
        return Ok(());
    };

    let settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    let build = settings.build();
    let trace = settings.trace();

    let store = PrimitiveStore::from_meshes(&cornell::meshes());
    let cache = settings.cache_dir.as_ref().map(BvhCache::new);
    let scene = Scene::new(
        store,
        cornell::materials(),
        cornell::lights(),
        Color::ZERO,
        &build,
        cache.as_ref(),
    );

    let camera = cornell::camera(args.width, args.height);
    let mut ctx = RenderContext::new(args.width, args.height, &trace)
        .context("failed to allocate render queues")?;

    let start = Instant::now();
    let mut scheduler = Scheduler::new(&scene, &camera, &mut ctx, &trace);
    for _ in 0..args.frames {
        scheduler.render_frame();
    }
    log::info!(
        "Rendered {} frames at {}x{} in {:.2?}",
        args.frames,
        args.width,
        args.height,
        start.elapsed()
    );

    let image = RgbaImage::from_raw(args.width, args.height, ctx.accumulation().to_rgba())
        .context("image buffer does not match the resolution")?;
    image
        .save(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    log::info!("Saved {}", args.output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Option<Args>> {
        Args::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_defaults() {
        assert_eq!(parse(&[]).unwrap(), Some(Args::default()));
    }

    #[test]
    fn test_flags() {
        let args = parse(&["--width", "64", "--height", "32", "-o", "x.png", "--frames", "2"])
            .unwrap()
            .unwrap();

        assert_eq!(args.width, 64);
        assert_eq!(args.height, 32);
        assert_eq!(args.frames, 2);
        assert_eq!(args.output, PathBuf::from("x.png"));
    }

    #[test]
    fn test_bad_arguments() {
        assert!(parse(&["--width"]).is_err());
        assert!(parse(&["--width", "wide"]).is_err());
        assert!(parse(&["--width", "0"]).is_err());
        assert!(parse(&["--bogus", "1"]).is_err());
        assert!(parse(&["--help"]).unwrap().is_none());
    }
}
