//! Surface interaction model.
//!
//! Reflectance `F` and sampling densities are both expressed in a
//! π-scaled measure: `F` is π times the BRDF and a density is π times the
//! solid-angle pdf. A Lambertian surface therefore has `F = 1` and density
//! `|cos θ|`. Every continuous lobe is sampled exactly proportionally to
//! `F · |cos θ|`, so the throughput ratio `F · |cos θ| / density` of a
//! sampled direction is bounded (it is 1 up to rounding).
//!
//! Directions follow the path: `incoming` points toward the surface along
//! the arriving ray, `outgoing` points away from it. Lobe colours come from
//! `Texture`s looked up at the hit's texture coordinate.

use rand::RngCore;
use std::fmt::Debug;
use zaphod_core::Texture;
use zaphod_math::{Vec2, Vec3};

use crate::sampling::{cosine_hemisphere, cosine_power_density, cosine_power_lobe, gen_f32};
use crate::scene::Intersection;

/// Color type alias (linear RGB radiance or reflectance)
pub type Color = Vec3;

/// Cosines below this are treated as grazing and contribute nothing.
const GRAZING_EPSILON: f32 = 1e-6;

/// Which lobe produced a sampled direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    Diffuse,
    Reflection,
    Transmission,
    /// Continues along the incoming direction through a transparent surface.
    PassThrough,
}

/// A sampled outgoing direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrdfSample {
    pub direction: Vec3,
    /// π-scaled density of `direction` under the material's full mixture.
    /// For delta samples this is the probability of picking the lobe.
    pub density: f32,
    pub kind: InteractionKind,
    /// Ideal mirror/refraction sample; `F` cannot represent it.
    pub delta: bool,
}

/// Trait for materials that describe how light interacts with surfaces.
pub trait Material: Send + Sync + Debug {
    /// π-scaled reflectance of the continuous lobes for a direction pair.
    fn f(&self, incoming: Vec3, outgoing: Vec3, normal: Vec3, uv: Vec2) -> f32;

    /// π-scaled density with which `sample` produces `outgoing`.
    fn density(&self, incoming: Vec3, outgoing: Vec3, normal: Vec3, uv: Vec2) -> f32;

    /// Draw an outgoing direction. `None` means the path is absorbed.
    fn sample(&self, hit: &Intersection, incoming: Vec3, rng: &mut dyn RngCore) -> Option<BrdfSample>;

    /// Spectral weight of a lobe (or the emitted radiance of a light).
    fn color(&self, uv: Vec2, kind: InteractionKind) -> Color;

    /// Full π-scaled BRDF including lobe colors, used for explicit connections.
    fn eval(&self, incoming: Vec3, outgoing: Vec3, normal: Vec3, uv: Vec2) -> Color {
        self.color(uv, InteractionKind::Diffuse) * self.f(incoming, outgoing, normal, uv)
    }

    /// Whether the material has a lobe of this kind.
    fn supports(&self, kind: InteractionKind) -> bool;

    fn is_light(&self) -> bool {
        false
    }

    /// Deep copy, so that shared material descriptions can be owned per object.
    fn box_clone(&self) -> Box<dyn Material>;
}

impl Clone for Box<dyn Material> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Throughput factor of a sampled bounce: `F · color · |cos| / density`,
/// or just the lobe color for delta samples.
pub fn scatter_weight(
    material: &dyn Material,
    incoming: Vec3,
    normal: Vec3,
    uv: Vec2,
    sample: &BrdfSample,
) -> Color {
    let color = material.color(uv, sample.kind);
    if sample.delta {
        return color;
    }
    if sample.density <= GRAZING_EPSILON {
        return Color::ZERO;
    }
    let cos = sample.direction.dot(normal).abs();
    color * (material.f(incoming, sample.direction, normal, uv) * cos / sample.density)
}

/// Normal flipped onto the side the incoming ray arrives from.
#[inline]
pub fn facing_normal(incoming: Vec3, normal: Vec3) -> Vec3 {
    if incoming.dot(normal) < 0.0 {
        normal
    } else {
        -normal
    }
}

/// Lambertian (diffuse) material.
#[derive(Debug, Clone)]
pub struct Diffuse {
    albedo: Texture,
}

impl Diffuse {
    /// Create a new Lambertian material with a constant or textured albedo.
    pub fn new(albedo: impl Into<Texture>) -> Self {
        Self { albedo: albedo.into() }
    }
}

impl Material for Diffuse {
    fn f(&self, incoming: Vec3, outgoing: Vec3, normal: Vec3, _uv: Vec2) -> f32 {
        if outgoing.dot(facing_normal(incoming, normal)) > GRAZING_EPSILON {
            1.0
        } else {
            0.0
        }
    }

    fn density(&self, incoming: Vec3, outgoing: Vec3, normal: Vec3, _uv: Vec2) -> f32 {
        outgoing.dot(facing_normal(incoming, normal)).max(0.0)
    }

    fn sample(&self, hit: &Intersection, incoming: Vec3, rng: &mut dyn RngCore) -> Option<BrdfSample> {
        let facing = facing_normal(incoming, hit.normal);
        let direction = cosine_hemisphere(facing, rng);
        let density = direction.dot(facing);
        if density <= GRAZING_EPSILON {
            return None;
        }

        Some(BrdfSample {
            direction,
            density,
            kind: InteractionKind::Diffuse,
            delta: false,
        })
    }

    fn color(&self, uv: Vec2, kind: InteractionKind) -> Color {
        match kind {
            InteractionKind::PassThrough => Color::ONE,
            _ => self.albedo.sample(uv),
        }
    }

    fn supports(&self, kind: InteractionKind) -> bool {
        kind == InteractionKind::Diffuse
    }

    fn box_clone(&self) -> Box<dyn Material> {
        Box::new(self.clone())
    }
}

/// Mixture of a diffuse, a reflective and a transmissive lobe.
///
/// The three weights are normalized to sum to 1 and double as lobe
/// selection probabilities. Roughness 0 makes the reflective and
/// transmissive lobes ideal (delta); otherwise they are cosine-power lobes
/// with exponent `1 / roughness` around the ideal direction.
#[derive(Debug, Clone)]
pub struct Glossy {
    diffuse_color: Texture,
    specular_color: Texture,
    kd: f32,
    ks: f32,
    kt: f32,
    roughness: f32,
    ior: f32,
}

impl Glossy {
    pub fn new(diffuse_color: impl Into<Texture>, specular_color: impl Into<Texture>, kd: f32, ks: f32, kt: f32) -> Self {
        let (kd, ks, kt) = (kd.max(0.0), ks.max(0.0), kt.max(0.0));
        let total = kd + ks + kt;
        let (kd, ks, kt) = if total > 0.0 {
            (kd / total, ks / total, kt / total)
        } else {
            (1.0, 0.0, 0.0)
        };

        Self {
            diffuse_color: diffuse_color.into(),
            specular_color: specular_color.into(),
            kd,
            ks,
            kt,
            roughness: 0.0,
            ior: 1.5,
        }
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness.clamp(0.0, 1.0);
        self
    }

    pub fn with_ior(mut self, ior: f32) -> Self {
        self.ior = ior.max(1.0);
        self
    }

    /// Normalized (diffuse, reflective, transmissive) weights.
    pub fn weights(&self) -> (f32, f32, f32) {
        (self.kd, self.ks, self.kt)
    }

    fn is_smooth(&self) -> bool {
        self.roughness <= 0.0
    }

    fn exponent(&self) -> f32 {
        1.0 / self.roughness.max(1e-4)
    }

    /// Ideal reflection and transmission axes for an incoming direction.
    /// Total internal reflection turns the transmission axis into the mirror one.
    fn lobe_axes(&self, incoming: Vec3, normal: Vec3) -> (Vec3, Vec3) {
        let facing = facing_normal(incoming, normal);
        let eta = if incoming.dot(normal) < 0.0 { 1.0 / self.ior } else { self.ior };
        let mirror = reflect(incoming, facing);
        let transmitted = refract(incoming, facing, eta).unwrap_or(mirror);
        (mirror, transmitted)
    }

    /// Per-lobe π-scaled densities (diffuse, reflective, transmissive) of
    /// `outgoing`, each already weighted by its selection probability.
    fn lobe_densities(&self, incoming: Vec3, outgoing: Vec3, normal: Vec3) -> [f32; 3] {
        let facing = facing_normal(incoming, normal);
        let side = outgoing.dot(facing);
        let diffuse = self.kd * side.max(0.0);
        if self.is_smooth() {
            return [diffuse, 0.0, 0.0];
        }

        let (mirror, transmitted) = self.lobe_axes(incoming, normal);
        let e = self.exponent();
        let on_side = |axis: Vec3| (axis.dot(facing) > 0.0) == (side > 0.0);

        let reflective = if on_side(mirror) {
            self.ks * cosine_power_density(mirror, outgoing, e)
        } else {
            0.0
        };
        let transmissive = if on_side(transmitted) {
            self.kt * cosine_power_density(transmitted, outgoing, e)
        } else {
            0.0
        };
        [diffuse, reflective, transmissive]
    }
}

impl Material for Glossy {
    fn f(&self, incoming: Vec3, outgoing: Vec3, normal: Vec3, _uv: Vec2) -> f32 {
        let cos = outgoing.dot(normal).abs();
        if cos <= GRAZING_EPSILON {
            return 0.0;
        }
        self.lobe_densities(incoming, outgoing, normal).iter().sum::<f32>() / cos
    }

    fn density(&self, incoming: Vec3, outgoing: Vec3, normal: Vec3, _uv: Vec2) -> f32 {
        self.lobe_densities(incoming, outgoing, normal).iter().sum()
    }

    fn eval(&self, incoming: Vec3, outgoing: Vec3, normal: Vec3, uv: Vec2) -> Color {
        let cos = outgoing.dot(normal).abs();
        if cos <= GRAZING_EPSILON {
            return Color::ZERO;
        }
        let [d, r, t] = self.lobe_densities(incoming, outgoing, normal);
        (self.diffuse_color.sample(uv) * d + self.specular_color.sample(uv) * (r + t)) / cos
    }

    fn sample(&self, hit: &Intersection, incoming: Vec3, rng: &mut dyn RngCore) -> Option<BrdfSample> {
        let facing = facing_normal(incoming, hit.normal);
        let choice = gen_f32(rng);

        let (kind, axis) = if choice < self.kd {
            (InteractionKind::Diffuse, None)
        } else {
            let (mirror, transmitted) = self.lobe_axes(incoming, hit.normal);
            if choice < self.kd + self.ks {
                (InteractionKind::Reflection, Some(mirror))
            } else {
                (InteractionKind::Transmission, Some(transmitted))
            }
        };

        let direction = match axis {
            None => cosine_hemisphere(facing, rng),
            Some(axis) if self.is_smooth() => {
                let density = if kind == InteractionKind::Reflection { self.ks } else { self.kt };
                return Some(BrdfSample {
                    direction: axis,
                    density,
                    kind,
                    delta: true,
                });
            }
            Some(axis) => {
                let direction = cosine_power_lobe(axis, self.exponent(), rng);
                // Perturbed samples that cross to the other side of the
                // surface than their lobe are absorbed.
                if (direction.dot(facing) > 0.0) != (axis.dot(facing) > 0.0) {
                    return None;
                }
                direction
            }
        };

        let density = self.density(incoming, direction, hit.normal, hit.uv);
        if density <= GRAZING_EPSILON {
            return None;
        }

        Some(BrdfSample {
            direction,
            density,
            kind,
            delta: false,
        })
    }

    fn color(&self, uv: Vec2, kind: InteractionKind) -> Color {
        match kind {
            InteractionKind::Diffuse => self.diffuse_color.sample(uv),
            InteractionKind::Reflection | InteractionKind::Transmission => self.specular_color.sample(uv),
            InteractionKind::PassThrough => Color::ONE,
        }
    }

    fn supports(&self, kind: InteractionKind) -> bool {
        match kind {
            InteractionKind::Diffuse => self.kd > 0.0,
            InteractionKind::Reflection => self.ks > 0.0,
            InteractionKind::Transmission => self.kt > 0.0,
            InteractionKind::PassThrough => false,
        }
    }

    fn box_clone(&self) -> Box<dyn Material> {
        Box::new(self.clone())
    }
}

/// Diffuse light emitter. Emits from both sides and never scatters.
#[derive(Debug, Clone)]
pub struct Emission {
    emittance: Color,
}

impl Emission {
    /// Create a new light with the given emitted radiance.
    pub fn new(emittance: Color) -> Self {
        Self { emittance }
    }
}

impl Material for Emission {
    fn f(&self, _incoming: Vec3, _outgoing: Vec3, _normal: Vec3, _uv: Vec2) -> f32 {
        0.0
    }

    fn density(&self, _incoming: Vec3, _outgoing: Vec3, _normal: Vec3, _uv: Vec2) -> f32 {
        0.0
    }

    fn sample(&self, _hit: &Intersection, _incoming: Vec3, _rng: &mut dyn RngCore) -> Option<BrdfSample> {
        None
    }

    fn color(&self, _uv: Vec2, _kind: InteractionKind) -> Color {
        self.emittance
    }

    fn eval(&self, _incoming: Vec3, _outgoing: Vec3, _normal: Vec3, _uv: Vec2) -> Color {
        Color::ZERO
    }

    fn supports(&self, _kind: InteractionKind) -> bool {
        false
    }

    fn is_light(&self) -> bool {
        true
    }

    fn box_clone(&self) -> Box<dyn Material> {
        Box::new(self.clone())
    }
}

/// Coverage-masked wrapper around another material.
///
/// Where the mean of `opacity` is `a`, a path continues straight through
/// with probability `1 - a` and otherwise scatters off the child, whose
/// response is scaled by `a`. Shadow rays still treat the surface as opaque.
#[derive(Debug, Clone)]
pub struct Transparent {
    opacity: Texture,
    child: Box<dyn Material>,
}

impl Transparent {
    pub fn new(opacity: impl Into<Texture>, child: impl Material + 'static) -> Self {
        Self {
            opacity: opacity.into(),
            child: Box::new(child),
        }
    }

    /// Probability of passing through at `uv`.
    pub fn pass_probability(&self, uv: Vec2) -> f32 {
        let opacity = self.opacity.sample(uv);
        (1.0 - (opacity.x + opacity.y + opacity.z) / 3.0).clamp(0.0, 1.0)
    }

    fn coverage(&self, uv: Vec2) -> f32 {
        1.0 - self.pass_probability(uv)
    }
}

impl Material for Transparent {
    fn f(&self, incoming: Vec3, outgoing: Vec3, normal: Vec3, uv: Vec2) -> f32 {
        self.coverage(uv) * self.child.f(incoming, outgoing, normal, uv)
    }

    fn density(&self, incoming: Vec3, outgoing: Vec3, normal: Vec3, uv: Vec2) -> f32 {
        self.coverage(uv) * self.child.density(incoming, outgoing, normal, uv)
    }

    fn sample(&self, hit: &Intersection, incoming: Vec3, rng: &mut dyn RngCore) -> Option<BrdfSample> {
        let pass = self.pass_probability(hit.uv);
        if gen_f32(rng) < pass {
            return Some(BrdfSample {
                direction: incoming,
                density: pass,
                kind: InteractionKind::PassThrough,
                delta: true,
            });
        }

        let mut sample = self.child.sample(hit, incoming, rng)?;
        sample.density *= 1.0 - pass;
        Some(sample)
    }

    fn color(&self, uv: Vec2, kind: InteractionKind) -> Color {
        match kind {
            InteractionKind::PassThrough => Color::ONE,
            _ => self.child.color(uv, kind),
        }
    }

    fn eval(&self, incoming: Vec3, outgoing: Vec3, normal: Vec3, uv: Vec2) -> Color {
        self.child.eval(incoming, outgoing, normal, uv) * self.coverage(uv)
    }

    fn supports(&self, kind: InteractionKind) -> bool {
        kind == InteractionKind::PassThrough || self.child.supports(kind)
    }

    fn is_light(&self) -> bool {
        self.child.is_light()
    }

    fn box_clone(&self) -> Box<dyn Material> {
        Box::new(self.clone())
    }
}

// =============================================================================
// Helper functions
// =============================================================================

/// Reflect a vector about a normal.
#[inline]
pub fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    v - 2.0 * v.dot(n) * n
}

/// Refract a unit vector through a surface whose normal faces against it.
/// Returns `None` on total internal reflection.
#[inline]
pub fn refract(uv: Vec3, n: Vec3, etai_over_etat: f32) -> Option<Vec3> {
    let cos_theta = (-uv).dot(n).min(1.0);
    let r_out_perp = etai_over_etat * (uv + cos_theta * n);
    let k = 1.0 - r_out_perp.length_squared();
    if k < 0.0 {
        return None;
    }
    Some((r_out_perp - k.sqrt() * n).normalize())
}
