//! `zaphod` - render a scene to an image file.

mod scenes;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use image::codecs::hdr::HdrEncoder;
use image::{Rgb, RgbaImage};
use zaphod_renderer::{
    color_to_rgba, BvhBackend, Color, IntegratorKind, IntersectionBackend, RenderConfig, RenderState, Scene,
    TileScheduler,
};

use crate::scenes::SceneKind;

/// Progressive Monte Carlo renderer.
#[derive(Debug, Parser)]
#[command(name = "zaphod", version, about)]
struct Args {
    /// Built-in scene to render
    #[arg(long, value_enum, default_value_t = SceneKind::Sphere)]
    scene: SceneKind,

    /// Additional Wavefront OBJ mesh to place in the scene
    #[arg(long)]
    obj: Option<PathBuf>,

    /// Image to texture the built-in scene's floor with
    #[arg(long)]
    floor_texture: Option<PathBuf>,

    /// JSON render configuration; command line flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Samples per pixel
    #[arg(long)]
    spp: Option<u32>,

    #[arg(long)]
    tile_size: Option<u32>,

    #[arg(long)]
    threads: Option<usize>,

    /// pt, bdpt, gdpt or normals
    #[arg(long)]
    integrator: Option<IntegratorKind>,

    /// Animation time to render at
    #[arg(long, default_value_t = 0.0)]
    time: f32,

    /// Fixed random seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    /// Trace meshes through a world-space BVH instead of per-object octrees
    #[arg(long)]
    bvh: bool,

    /// Output image; `.hdr` keeps linear radiance, anything else is gamma-encoded
    #[arg(long, short, default_value = "render.png")]
    output: PathBuf,

    /// Also write gradient magnitude images (gdpt only)
    #[arg(long)]
    gradients: bool,
}

fn load_config(args: &Args) -> Result<RenderConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("failed to open config {}", path.display()))?;
            serde_json::from_reader(file).with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => RenderConfig::default(),
    };

    if let Some(width) = args.width {
        config.width = width;
    }
    if let Some(height) = args.height {
        config.height = height;
    }
    if let Some(spp) = args.spp {
        config.samples_per_pixel = spp;
    }
    if let Some(tile_size) = args.tile_size {
        config.tile_size = tile_size;
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if let Some(integrator) = args.integrator {
        config.integrator = integrator;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.validate()?;
    Ok(config)
}

fn build_scene(args: &Args) -> Result<Scene> {
    let floor = args.floor_texture.as_ref().map(scenes::load_texture).transpose()?;
    let (mut objects, camera) = scenes::build(args.scene, floor)?;
    if let Some(path) = &args.obj {
        objects.extend(scenes::load_obj(path)?);
    }
    let backend = args
        .bvh
        .then(|| Box::new(BvhBackend::new()) as Box<dyn IntersectionBackend>);
    Ok(Scene::new(objects, camera, backend)?)
}

fn write_hdr(path: &Path, pixels: &[Color], width: u32, height: u32) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let rgb: Vec<Rgb<f32>> = pixels.iter().map(|c| Rgb([c.x, c.y, c.z])).collect();
    HdrEncoder::new(BufWriter::new(file)).encode(&rgb, width as usize, height as usize)?;
    Ok(())
}

fn write_png(path: &Path, pixels: &[Color], width: u32, height: u32) -> Result<()> {
    let bytes: Vec<u8> = pixels.iter().flat_map(|&c| color_to_rgba(c)).collect();
    let image = RgbaImage::from_raw(width, height, bytes).context("pixel buffer does not match image size")?;
    image.save(path).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn write_image(path: &Path, pixels: &[Color], width: u32, height: u32) -> Result<()> {
    let is_hdr = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("hdr"));
    if is_hdr {
        write_hdr(path, pixels, width, height)?;
    } else {
        write_png(path, pixels, width, height)?;
    }
    log::info!("Wrote {}", path.display());
    Ok(())
}

/// `render.png` -> `render_dx.png`
fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("render");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext),
        None => format!("{}_{}", stem, suffix),
    };
    path.with_file_name(name)
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let scene = build_scene(&args)?;
    let (width, height) = (config.width, config.height);

    let mut scheduler = TileScheduler::new(scene, config)?;
    let start = Instant::now();
    scheduler.render(args.time)?;

    while scheduler.state() == RenderState::Rendering {
        thread::sleep(Duration::from_millis(500));
        let (finished, total) = scheduler.progress();
        log::debug!("{}/{} tiles", finished, total);
    }
    scheduler.wait();
    log::info!("Rendered in {:.2?}", start.elapsed());

    write_image(&args.output, &scheduler.pixels(), width, height)?;

    if args.gradients {
        match scheduler.gradients() {
            Some(gradients) => {
                let magnitude = |g: Vec<Color>| g.into_iter().map(|c| c.abs()).collect::<Vec<_>>();
                write_image(&suffixed(&args.output, "dx"), &magnitude(gradients.horizontal()), width, height)?;
                write_image(&suffixed(&args.output, "dy"), &magnitude(gradients.vertical()), width, height)?;
            }
            None => log::warn!("--gradients needs the gdpt integrator; skipping gradient images"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from(["zaphod", "--width", "32", "--integrator", "bdpt", "--seed", "3"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.width, 32);
        assert_eq!(config.height, RenderConfig::default().height);
        assert_eq!(config.integrator, IntegratorKind::Bdpt);
        assert_eq!(config.seed, Some(3));
    }

    #[test]
    fn test_rejects_invalid_flags() {
        let args = Args::parse_from(["zaphod", "--spp", "0"]);
        assert!(load_config(&args).is_err());
        assert!(Args::try_parse_from(["zaphod", "--integrator", "whitted"]).is_err());
    }

    #[test]
    fn test_suffixed() {
        assert_eq!(suffixed(Path::new("out/render.png"), "dx"), PathBuf::from("out/render_dx.png"));
        assert_eq!(suffixed(Path::new("image"), "dy"), PathBuf::from("image_dy"));
    }

    #[test]
    fn test_builtin_scenes_have_lights() {
        for kind in [SceneKind::Sphere, SceneKind::Cornell] {
            let args = Args::parse_from(["zaphod"]);
            let args = Args { scene: kind, ..args };
            let scene = build_scene(&args).unwrap();
            assert!(!scene.lights().is_empty(), "{:?}", kind);
        }
    }

    #[test]
    fn test_missing_floor_texture_is_an_error() {
        let args = Args::parse_from(["zaphod", "--floor-texture", "does/not/exist.png"]);
        assert!(build_scene(&args).is_err());
    }
}
