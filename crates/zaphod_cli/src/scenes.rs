//! Built-in demo scenes and OBJ import.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use zaphod_core::{AnimatedTransform, ImageTexture, Texture, Timeline, Transform, TriangleMesh};
use zaphod_math::{Vec2, Vec3};
use zaphod_renderer::{
    Camera, Color, Diffuse, Emission, Glossy, PinholeCamera, SceneObject, Shape, ThinLensCamera, Transparent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SceneKind {
    /// Glossy sphere sliding over a checkered floor under a spherical lamp
    Sphere,
    /// Closed box with coloured side walls and a ceiling light
    Cornell,
}

/// Objects and camera of a built-in scene. `floor` replaces the scene's
/// own floor colour.
pub fn build(kind: SceneKind, floor: Option<Texture>) -> Result<(Vec<SceneObject>, Arc<dyn Camera>)> {
    match kind {
        SceneKind::Sphere => sphere_scene(floor),
        SceneKind::Cornell => Ok(cornell_scene(floor)),
    }
}

/// Load an image file as a floor texture.
pub fn load_texture<P: AsRef<Path>>(path: P) -> Result<Texture> {
    let path = path.as_ref();
    let image = image::open(path)
        .with_context(|| format!("failed to load texture {}", path.display()))?
        .to_rgba8();
    let texture = ImageTexture::from_srgb8(image.width(), image.height(), image.as_raw())
        .with_context(|| format!("invalid texture {}", path.display()))?;
    log::info!("Loaded texture {} ({}x{})", path.display(), texture.width(), texture.height());
    Ok(texture.into())
}

fn sphere_scene(floor: Option<Texture>) -> Result<(Vec<SceneObject>, Arc<dyn Camera>)> {
    let floor = match floor {
        Some(texture) => texture,
        None => ImageTexture::checker(16, Color::splat(0.7), Color::splat(0.25))?.into(),
    };
    // Cut-out card: opaque checker cells, the others let light through.
    let stencil = ImageTexture::checker(4, Color::ONE, Color::ZERO)?;

    let slide = AnimatedTransform {
        translation: Timeline::new()
            .with_key(0.0, Vec3::new(-1.0, 1.0, 0.0))
            .with_key(1.0, Vec3::new(1.0, 1.0, 0.0)),
        ..Default::default()
    };
    let objects = vec![
        SceneObject::new("floor", Shape::cuboid(Vec3::new(20.0, 0.5, 20.0)), Diffuse::new(floor))
            .with_transform(Transform::from_translation(Vec3::new(0.0, -0.5, 0.0))),
        SceneObject::new(
            "ball",
            Shape::sphere(1.0),
            Glossy::new(Color::new(0.8, 0.2, 0.1), Color::splat(0.9), 0.6, 0.4, 0.0).with_roughness(0.2),
        )
        .with_transform(Transform::from_translation(Vec3::new(-1.0, 1.0, 0.0)))
        .with_animation(slide),
        SceneObject::new("glass", Shape::sphere(0.6), Glossy::new(Color::ZERO, Color::ONE, 0.0, 0.1, 0.9))
            .with_transform(Transform::from_translation(Vec3::new(1.8, 0.6, 1.5))),
        SceneObject::new(
            "card",
            Shape::cuboid(Vec3::new(0.8, 0.8, 0.02)),
            Transparent::new(stencil, Diffuse::new(Color::new(0.2, 0.3, 0.8))),
        )
        .with_transform(Transform::from_translation(Vec3::new(2.5, 0.8, -1.5))),
        SceneObject::new("lamp", Shape::sphere(1.5), Emission::new(Color::splat(6.0)))
            .with_transform(Transform::from_translation(Vec3::new(-3.0, 7.0, 4.0))),
    ];
    let pinhole = PinholeCamera::new()
        .with_position(Vec3::new(0.0, 2.5, 8.0), Vec3::new(0.0, 1.0, 0.0), Vec3::Y)
        .with_fov(45.0);
    let camera = ThinLensCamera::new(pinhole).with_lens(0.05, 8.0);
    Ok((objects, Arc::new(camera)))
}

fn cornell_scene(floor: Option<Texture>) -> (Vec<SceneObject>, Arc<dyn Camera>) {
    let wall = |name: &str, half: Vec3, at: Vec3, color: Texture| {
        SceneObject::new(name, Shape::cuboid(half), Diffuse::new(color)).with_transform(Transform::from_translation(at))
    };
    let white = Texture::from(Color::splat(0.73));
    let thickness = 0.05;
    let objects = vec![
        wall(
            "floor",
            Vec3::new(1.0, thickness, 1.0),
            Vec3::new(0.0, -thickness, 0.0),
            floor.unwrap_or_else(|| white.clone()),
        ),
        wall("ceiling", Vec3::new(1.0, thickness, 1.0), Vec3::new(0.0, 2.0 + thickness, 0.0), white.clone()),
        wall("back", Vec3::new(1.0, 1.0, thickness), Vec3::new(0.0, 1.0, -1.0 - thickness), white.clone()),
        wall("left", Vec3::new(thickness, 1.0, 1.0), Vec3::new(-1.0 - thickness, 1.0, 0.0), Color::new(0.65, 0.05, 0.05).into()),
        wall("right", Vec3::new(thickness, 1.0, 1.0), Vec3::new(1.0 + thickness, 1.0, 0.0), Color::new(0.12, 0.45, 0.15).into()),
        SceneObject::new("light", Shape::cuboid(Vec3::new(0.25, 0.01, 0.25)), Emission::new(Color::splat(15.0)))
            .with_transform(Transform::from_translation(Vec3::new(0.0, 1.98, 0.0))),
        wall("block", Vec3::new(0.3, 0.6, 0.3), Vec3::new(-0.35, 0.6, -0.3), white),
        SceneObject::new("mirror ball", Shape::sphere(0.3), Glossy::new(Color::ZERO, Color::splat(0.9), 0.0, 1.0, 0.0))
            .with_transform(Transform::from_translation(Vec3::new(0.4, 0.3, 0.3))),
    ];
    let camera = PinholeCamera::new()
        .with_position(Vec3::new(0.0, 1.0, 3.9), Vec3::new(0.0, 1.0, 0.0), Vec3::Y)
        .with_fov(40.0);
    (objects, Arc::new(camera))
}

/// Load every model of a Wavefront OBJ file as a diffuse mesh object.
pub fn load_obj<P: AsRef<Path>>(path: P) -> Result<Vec<SceneObject>> {
    let path = path.as_ref();
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ..Default::default()
        },
    )
    .with_context(|| format!("failed to load OBJ file {}", path.display()))?;

    if models.is_empty() {
        anyhow::bail!("No models found in OBJ file {}", path.display());
    }

    let mut objects = Vec::with_capacity(models.len());
    for model in models {
        let mesh = &model.mesh;
        let positions: Vec<Vec3> = mesh.positions.chunks_exact(3).map(Vec3::from_slice).collect();
        let vertex_count = positions.len();

        let mut triangles = TriangleMesh::new(positions, mesh.indices.clone())
            .with_context(|| format!("invalid mesh '{}'", model.name))?;
        if mesh.normals.len() == vertex_count * 3 {
            let normals = mesh.normals.chunks_exact(3).map(Vec3::from_slice).collect();
            triangles = triangles.with_normals(normals)?;
        } else {
            log::info!("Computing normals for '{}'", model.name);
            triangles.compute_normals();
        }
        if mesh.texcoords.len() == vertex_count * 2 {
            let uvs = mesh.texcoords.chunks_exact(2).map(Vec2::from_slice).collect();
            triangles = triangles.with_uvs(uvs)?;
        }

        log::info!(
            "Loaded '{}': {} vertices, {} triangles",
            model.name,
            triangles.vertex_count(),
            triangles.triangle_count()
        );
        objects.push(SceneObject::new(
            model.name.clone(),
            Shape::mesh(Arc::new(triangles)),
            Diffuse::new(Color::splat(0.8)),
        ));
    }
    Ok(objects)
}
