//! Keyframe animation for object transforms.
//!
//! A `Timeline` holds keyframes sorted by time. Evaluating before the first
//! key or after the last one clamps to that key; in between, neighbouring
//! keys are blended with `Interpolate` (lerp for vectors, slerp for
//! rotations).

use glam::{Quat, Vec3};

use crate::hierarchy::Transform;

/// Blend between two keyframe values.
pub trait Interpolate: Copy {
    fn interpolate(a: Self, b: Self, t: f32) -> Self;
}

impl Interpolate for f32 {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a + (b - a) * t
    }
}

impl Interpolate for Vec3 {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a.lerp(b, t)
    }
}

impl Interpolate for Quat {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a.slerp(b, t)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keyframe<T> {
    pub time: f32,
    pub value: T,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Timeline<T> {
    keyframes: Vec<Keyframe<T>>,
}

impl<T> Default for Timeline<T> {
    fn default() -> Self {
        Self { keyframes: Vec::new() }
    }
}

impl<T: Interpolate> Timeline<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `insert`.
    pub fn with_key(mut self, time: f32, value: T) -> Self {
        self.insert(time, value);
        self
    }

    /// Insert a keyframe, replacing any key at the same time.
    pub fn insert(&mut self, time: f32, value: T) {
        match self.keyframes.binary_search_by(|k| k.time.total_cmp(&time)) {
            Ok(i) => self.keyframes[i].value = value,
            Err(i) => self.keyframes.insert(i, Keyframe { time, value }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    /// Value at `time`, or `None` for an empty timeline.
    pub fn evaluate(&self, time: f32) -> Option<T> {
        let first = self.keyframes.first()?;
        let next = self.keyframes.partition_point(|k| k.time <= time);

        if next == 0 {
            return Some(first.value);
        }
        if next == self.keyframes.len() {
            return self.keyframes.last().map(|k| k.value);
        }

        let start = &self.keyframes[next - 1];
        let end = &self.keyframes[next];
        let t = (time - start.time) / (end.time - start.time);
        Some(T::interpolate(start.value, end.value, t))
    }
}

/// Per-channel keyframes for a transform. Channels without keys keep the
/// value of the base transform.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimatedTransform {
    pub translation: Timeline<Vec3>,
    pub rotation: Timeline<Quat>,
    pub scale: Timeline<Vec3>,
}

impl AnimatedTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(&self, time: f32, base: &Transform) -> Transform {
        Transform {
            translation: self.translation.evaluate(time).unwrap_or(base.translation),
            rotation: self.rotation.evaluate(time).unwrap_or(base.rotation),
            scale: self.scale.evaluate(time).unwrap_or(base.scale),
        }
    }
}
