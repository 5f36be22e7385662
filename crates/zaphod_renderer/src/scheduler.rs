//! Multi-threaded progressive tile rendering.
//!
//! A render enqueues a full-quality pass and then a coarse preview pass on
//! one LIFO queue, so the preview drains first. Workers pop tiles, run the
//! integrator once per sample per pixel and fold each sample into the
//! shared [`AccumulationBuffer`].
//!
//! Tiles of different passes overlap, so a worker only starts a tile of
//! the next pass once every tile of the current one has finished. Inside a
//! pass tiles are disjoint and each pixel has a single writer.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::buffer::{AccumulationBuffer, GradientBuffer};
use crate::config::RenderConfig;
use crate::error::RenderError;
use crate::integrator::{create_integrator, Integrator, IntegratorKind};
use crate::material::Color;
use crate::scene::Scene;
use crate::tile::{generate_tiles, Tile};

/// Pass indices, in pop order.
const PREVIEW_PASS: u32 = 0;
const FULL_PASS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Rendering,
}

#[derive(Debug, Default)]
struct TileQueue {
    tiles: Vec<Tile>,
    /// Pass of the tiles currently being rendered.
    pass: u32,
    in_flight: usize,
}

/// State shared between the scheduler and its workers.
#[derive(Debug)]
struct Shared {
    queue: Mutex<TileQueue>,
    pass_done: Condvar,
    shutdown: AtomicBool,
    finished: AtomicUsize,
    total: AtomicUsize,
    pixels: AccumulationBuffer,
    gradients: Option<GradientBuffer>,
}

impl Shared {
    /// Pop the next tile, blocking while the previous pass is still in flight.
    fn next_tile(&self) -> Option<Tile> {
        let mut queue = self.queue.lock();
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return None;
            }
            let pass = queue.tiles.last()?.pass;
            if pass == queue.pass || queue.in_flight == 0 {
                if pass != queue.pass {
                    log::info!("Starting pass {}", pass);
                    queue.pass = pass;
                }
                queue.in_flight += 1;
                return queue.tiles.pop();
            }
            self.pass_done.wait(&mut queue);
        }
    }

    fn finish_tile(&self) {
        self.finished.fetch_add(1, Ordering::Relaxed);
        let mut queue = self.queue.lock();
        queue.in_flight -= 1;
        if queue.in_flight == 0 {
            let pass_over = queue.tiles.last().map_or(true, |t| t.pass != queue.pass);
            if pass_over {
                log::info!("Pass {} finished", queue.pass);
            }
            self.pass_done.notify_all();
        }
    }

    fn request_shutdown(&self) {
        let _queue = self.queue.lock();
        self.shutdown.store(true, Ordering::Relaxed);
        self.pass_done.notify_all();
    }
}

/// Renders a scene progressively on a pool of worker threads.
pub struct TileScheduler {
    scene: Arc<Scene>,
    integrator: Arc<dyn Integrator>,
    config: RenderConfig,
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for TileScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileScheduler")
            .field("integrator", &self.integrator.name())
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl TileScheduler {
    pub fn new(scene: Scene, config: RenderConfig) -> Result<Self, RenderError> {
        let integrator = create_integrator(config.integrator, config.integrator_config);
        Self::with_integrator(scene, config, Arc::from(integrator))
    }

    /// Use a caller-provided integrator instead of `config.integrator`.
    pub fn with_integrator(
        scene: Scene,
        config: RenderConfig,
        integrator: Arc<dyn Integrator>,
    ) -> Result<Self, RenderError> {
        config.validate()?;
        let gradients = integrator
            .produces_gradients()
            .then(|| GradientBuffer::new(config.width, config.height));
        let shared = Shared {
            queue: Mutex::new(TileQueue::default()),
            pass_done: Condvar::new(),
            shutdown: AtomicBool::new(false),
            finished: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            pixels: AccumulationBuffer::new(config.width, config.height),
            gradients,
        };
        Ok(Self {
            scene: Arc::new(scene),
            integrator,
            config,
            shared: Arc::new(shared),
            workers: Vec::new(),
        })
    }

    /// Start rendering the scene at `time`. A render already running is
    /// finished first.
    pub fn render(&mut self, time: f32) -> Result<(), RenderError> {
        self.wait();

        let scene = Arc::get_mut(&mut self.scene).ok_or(RenderError::SceneBusy)?;
        scene.set_time(time)?;
        if scene.lights().is_empty() && matches!(self.config.integrator, IntegratorKind::Bdpt | IntegratorKind::Gdpt) {
            log::warn!("Scene has no lights; {} will render black", self.config.integrator);
        }

        let shared = &self.shared;
        shared.pixels.clear();
        if let Some(gradients) = &shared.gradients {
            gradients.clear();
        }
        shared.shutdown.store(false, Ordering::Relaxed);
        shared.finished.store(0, Ordering::Relaxed);

        let (width, height) = (self.config.width, self.config.height);
        let (preview_samples, full_samples) = self.config.pass_samples();
        let tile_size = self.config.tile_size;
        {
            let mut queue = shared.queue.lock();
            queue.tiles.clear();
            queue.in_flight = 0;
            if full_samples > 0 {
                let full = generate_tiles(width, height, tile_size, full_samples, FULL_PASS);
                queue.tiles.extend(full.into_iter().rev());
            }
            let preview = generate_tiles(width, height, tile_size * 2, preview_samples, PREVIEW_PASS);
            queue.tiles.extend(preview.into_iter().rev());
            queue.pass = PREVIEW_PASS;
            shared.total.store(queue.tiles.len(), Ordering::Relaxed);
            log::debug!("Queued {} tiles", queue.tiles.len());
        }

        log::info!(
            "Rendering {}x{} at t={} with {} ({} spp, {} threads)",
            width,
            height,
            time,
            self.integrator.name(),
            self.config.samples_per_pixel,
            self.config.threads
        );

        for index in 0..self.config.threads {
            let rng = match self.config.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
                None => StdRng::from_entropy(),
            };
            let worker = Worker {
                scene: Arc::clone(&self.scene),
                integrator: Arc::clone(&self.integrator),
                shared: Arc::clone(&self.shared),
                width,
                height,
                rng,
            };
            let spawned = thread::Builder::new()
                .name(format!("zaphod-worker-{}", index))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(err) => {
                    self.shutdown();
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    /// Block until every worker has exited.
    pub fn wait(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Render worker panicked");
            }
        }
        log::info!(
            "Render finished: {}/{} tiles",
            self.shared.finished.load(Ordering::Relaxed),
            self.shared.total.load(Ordering::Relaxed)
        );
    }

    /// Ask workers to stop after their current sample pass, then join them.
    pub fn shutdown(&mut self) {
        self.shared.request_shutdown();
        self.wait();
    }

    pub fn state(&self) -> RenderState {
        if self.workers.iter().any(|w| !w.is_finished()) {
            RenderState::Rendering
        } else {
            RenderState::Idle
        }
    }

    /// Finished and total tile counts of the current render.
    pub fn progress(&self) -> (usize, usize) {
        (
            self.shared.finished.load(Ordering::Relaxed),
            self.shared.total.load(Ordering::Relaxed),
        )
    }

    /// Current running-mean radiance, row-major.
    pub fn pixels(&self) -> Vec<Color> {
        self.shared.pixels.pixels()
    }

    pub fn buffer(&self) -> &AccumulationBuffer {
        &self.shared.pixels
    }

    /// Gradient estimates, when the integrator produces them.
    pub fn gradients(&self) -> Option<&GradientBuffer> {
        self.shared.gradients.as_ref()
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }
}

impl Drop for TileScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Finishes a tile when dropped, so a panicking integrator still releases
/// the pass barrier.
struct TileGuard<'a>(&'a Shared);

impl Drop for TileGuard<'_> {
    fn drop(&mut self) {
        self.0.finish_tile();
    }
}

struct Worker {
    scene: Arc<Scene>,
    integrator: Arc<dyn Integrator>,
    shared: Arc<Shared>,
    width: u32,
    height: u32,
    rng: StdRng,
}

impl Worker {
    fn run(mut self) {
        let shared = Arc::clone(&self.shared);
        while let Some(tile) = shared.next_tile() {
            let _guard = TileGuard(&shared);
            self.render_tile(&tile);
        }
    }

    fn render_tile(&mut self, tile: &Tile) {
        for _ in 0..tile.samples {
            if self.shared.shutdown.load(Ordering::Relaxed) {
                return;
            }
            for (x, y) in tile.pixels() {
                let sample = self
                    .integrator
                    .sample(&self.scene, x, y, self.width, self.height, &mut self.rng);
                self.shared.pixels.add_sample(x, y, sample.radiance);
                if let (Some(buffer), Some(gradients)) = (&self.shared.gradients, &sample.gradients) {
                    buffer.add_sample(x, y, gradients);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PinholeCamera;
    use crate::integrator::PixelSample;
    use crate::material::{Diffuse, Emission};
    use crate::object::SceneObject;
    use crate::shape::Shape;
    use rand::RngCore;
    use zaphod_core::Transform;
    use zaphod_math::{Ray, Vec3};

    fn camera() -> Arc<PinholeCamera> {
        Arc::new(
            PinholeCamera::new()
                .with_position(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y)
                .with_fov(60.0),
        )
    }

    fn lit_floor() -> Scene {
        let objects = vec![
            SceneObject::new("floor", Shape::cuboid(Vec3::new(5.0, 0.5, 5.0)), Diffuse::new(Color::splat(0.7)))
                .with_transform(Transform::from_translation(Vec3::new(0.0, -1.5, 0.0))),
            SceneObject::new("lamp", Shape::sphere(0.5), Emission::new(Color::splat(4.0)))
                .with_transform(Transform::from_translation(Vec3::new(0.0, 1.0, 0.0))),
        ];
        Scene::new(objects, camera(), None).unwrap()
    }

    fn config(width: u32, height: u32, spp: u32) -> RenderConfig {
        RenderConfig {
            width,
            height,
            samples_per_pixel: spp,
            tile_size: 8,
            threads: 1,
            seed: Some(7),
            ..Default::default()
        }
    }

    #[test]
    fn test_seeded_single_thread_is_deterministic() {
        let render = || {
            let mut scheduler = TileScheduler::new(lit_floor(), config(16, 12, 6)).unwrap();
            scheduler.render(0.0).unwrap();
            scheduler.wait();
            scheduler.pixels()
        };
        let first = render();
        assert_eq!(first, render());
        assert!(first.iter().any(|c| c.x > 0.0));
    }

    #[test]
    fn test_every_pixel_gets_every_sample() {
        let mut config = config(20, 13, 7);
        config.threads = 3;
        let mut scheduler = TileScheduler::new(lit_floor(), config).unwrap();
        scheduler.render(0.0).unwrap();
        scheduler.wait();

        for y in 0..13 {
            for x in 0..20 {
                assert_eq!(scheduler.buffer().count(x, y), 7, "pixel ({}, {})", x, y);
            }
        }
        let (finished, total) = scheduler.progress();
        assert_eq!(finished, total);
        assert_eq!(scheduler.state(), RenderState::Idle);
        assert!(scheduler.gradients().is_none());
    }

    #[test]
    fn test_empty_scene_is_black() {
        let scene = Scene::new(Vec::new(), camera(), None).unwrap();
        let mut scheduler = TileScheduler::new(scene, config(8, 8, 1)).unwrap();
        scheduler.render(0.0).unwrap();
        scheduler.wait();
        assert!(scheduler.pixels().iter().all(|&c| c == Color::ZERO));
        assert_eq!(scheduler.buffer().count(3, 3), 1);
    }

    #[test]
    fn test_emissive_sphere_converges() {
        let sphere = SceneObject::new("sphere", Shape::sphere(1.0), Emission::new(Color::ONE));
        let scene = Scene::new(vec![sphere], camera(), None).unwrap();
        let mut scheduler = TileScheduler::new(scene, config(16, 16, 16)).unwrap();

        for spp in [16, 256, 4096] {
            scheduler.config.samples_per_pixel = spp;
            scheduler.render(0.0).unwrap();
            scheduler.wait();
            let center = scheduler.buffer().get(8, 8);
            assert_eq!(scheduler.buffer().count(8, 8), spp);
            assert!((center - Color::ONE).abs().max_element() < 1e-4, "{} spp: {:?}", spp, center);
        }
    }

    #[test]
    fn test_gradient_integrator_fills_gradients() {
        let mut config = config(8, 8, 2);
        config.integrator = IntegratorKind::Gdpt;
        let mut scheduler = TileScheduler::new(lit_floor(), config).unwrap();
        scheduler.render(0.0).unwrap();
        scheduler.wait();
        let gradients = scheduler.gradients().unwrap();
        assert_eq!(gradients.horizontal().len(), 64);
        assert_eq!(gradients.vertical().len(), 64);
    }

    #[test]
    fn test_shutdown_stops_render() {
        let mut scheduler = TileScheduler::new(lit_floor(), config(64, 64, 10_000)).unwrap();
        scheduler.render(0.0).unwrap();
        scheduler.shutdown();
        assert_eq!(scheduler.state(), RenderState::Idle);
        let (finished, total) = scheduler.progress();
        assert!(finished < total);
    }

    /// Panics on pixel (0, 0), returns white everywhere else.
    #[derive(Debug)]
    struct CornerPanic;

    impl Integrator for CornerPanic {
        fn name(&self) -> &'static str {
            "corner-panic"
        }

        fn radiance(&self, _scene: &Scene, _ray: &Ray, _rng: &mut dyn RngCore) -> Color {
            Color::ONE
        }

        fn sample(&self, _scene: &Scene, x: u32, y: u32, _w: u32, _h: u32, _rng: &mut dyn RngCore) -> PixelSample {
            if x == 0 && y == 0 {
                panic!("integrator failure at the corner pixel");
            }
            PixelSample::new(Color::ONE)
        }
    }

    #[test]
    fn test_worker_panic_releases_pass_barrier() {
        let mut config = config(16, 16, 8);
        config.threads = 3;
        let full_samples = config.pass_samples().1;
        let mut scheduler = TileScheduler::with_integrator(lit_floor(), config, Arc::new(CornerPanic)).unwrap();
        scheduler.render(0.0).unwrap();
        // One worker dies in the preview pass and one in the full pass; the
        // third must still be let through to finish the full pass.
        scheduler.wait();

        assert_eq!(scheduler.state(), RenderState::Idle);
        let (finished, total) = scheduler.progress();
        assert_eq!(finished, total);
        assert!(scheduler.buffer().count(15, 15) >= full_samples);
        assert_eq!(scheduler.buffer().get(15, 15), Color::ONE);
    }

    #[test]
    fn test_render_rejects_shared_scene() {
        let mut scheduler = TileScheduler::new(lit_floor(), config(4, 4, 1)).unwrap();
        let _held = Arc::clone(&scheduler.scene);
        assert!(matches!(scheduler.render(0.0), Err(RenderError::SceneBusy)));
    }

    #[test]
    fn test_invalid_config() {
        let config = RenderConfig {
            samples_per_pixel: 0,
            ..Default::default()
        };
        assert!(TileScheduler::new(lit_floor(), config).is_err());
    }
}
