//! Object transforms and the parent/child hierarchy.

use glam::{Mat4, Quat, Vec3};

use crate::error::HierarchyError;

/// Index of a node in a `TransformHierarchy`.
pub type NodeId = usize;

/// Transform components that can be composed into a matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Translation
    pub translation: Vec3,

    /// Rotation (as quaternion)
    pub rotation: Quat,

    /// Scale
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Create a new transform with only translation.
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Convert to a 4x4 transformation matrix.
    ///
    /// Order: Scale -> Rotate -> Translate (SRT)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

#[derive(Clone, Debug)]
struct TransformNode {
    local: Transform,
    parent: Option<NodeId>,
    world: Mat4,
    inverse: Mat4,
    dirty: bool,
}

/// A forest of transforms with cached world matrices.
///
/// A node's parent must already exist when the node is added, so parents
/// always precede their children and the graph can never contain a cycle.
/// Mutating a node marks it dirty; `update` recomputes every dirty node and
/// every descendant of one in a single forward pass.
#[derive(Clone, Debug, Default)]
pub struct TransformHierarchy {
    nodes: Vec<TransformNode>,
}

impl TransformHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Its world matrix is resolved on the next `update`.
    pub fn add(&mut self, local: Transform, parent: Option<NodeId>) -> Result<NodeId, HierarchyError> {
        if let Some(parent) = parent {
            if parent >= self.nodes.len() {
                return Err(HierarchyError::UnknownParent {
                    parent,
                    len: self.nodes.len(),
                });
            }
        }

        self.nodes.push(TransformNode {
            local,
            parent,
            world: Mat4::IDENTITY,
            inverse: Mat4::IDENTITY,
            dirty: true,
        });
        Ok(self.nodes.len() - 1)
    }

    /// Replace a node's local transform and invalidate its cached matrices.
    pub fn set_local(&mut self, id: NodeId, local: Transform) -> Result<(), HierarchyError> {
        let node = self.nodes.get_mut(id).ok_or(HierarchyError::UnknownNode(id))?;
        if node.local != local {
            node.local = local;
            node.dirty = true;
        }
        Ok(())
    }

    pub fn local(&self, id: NodeId) -> Option<&Transform> {
        self.nodes.get(id).map(|n| &n.local)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    /// True when the node or one of its ancestors changed since the last update.
    pub fn is_dirty(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(i) = current {
            match self.nodes.get(i) {
                Some(node) if node.dirty => return true,
                Some(node) => current = node.parent,
                None => return false,
            }
        }
        false
    }

    /// Recompute stale world matrices. Returns the ids that changed.
    pub fn update(&mut self) -> Vec<NodeId> {
        let mut changed = vec![false; self.nodes.len()];

        for i in 0..self.nodes.len() {
            let parent = self.nodes[i].parent;
            let parent_changed = parent.is_some_and(|p| changed[p]);
            if !self.nodes[i].dirty && !parent_changed {
                continue;
            }

            let parent_world = parent.map_or(Mat4::IDENTITY, |p| self.nodes[p].world);
            let node = &mut self.nodes[i];
            node.world = parent_world * node.local.to_matrix();
            node.inverse = node.world.inverse();
            node.dirty = false;
            changed[i] = true;
        }

        changed
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| c.then_some(i))
            .collect()
    }

    /// Cached local-to-world matrix (as of the last `update`).
    pub fn world(&self, id: NodeId) -> Mat4 {
        self.nodes.get(id).map_or(Mat4::IDENTITY, |n| n.world)
    }

    /// Cached world-to-local matrix (as of the last `update`).
    pub fn inverse(&self, id: NodeId) -> Mat4 {
        self.nodes.get(id).map_or(Mat4::IDENTITY, |n| n.inverse)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_srt_order() {
        let t = Transform::from_translation(Vec3::new(10.0, 0.0, 0.0))
            .with_rotation(Quat::from_rotation_z(PI / 2.0))
            .with_scale(Vec3::splat(2.0));

        // Scale first (x -> 2x), then rotate (x -> y), then translate.
        let p = t.to_matrix().transform_point3(Vec3::X);
        assert!((p - Vec3::new(10.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_child_composes_with_parent() {
        let mut h = TransformHierarchy::new();
        let root = h.add(Transform::from_translation(Vec3::new(1.0, 0.0, 0.0)), None).unwrap();
        let child = h.add(Transform::from_translation(Vec3::new(0.0, 2.0, 0.0)), Some(root)).unwrap();
        h.update();

        let p = h.world(child).transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-6);

        let back = h.inverse(child).transform_point3(p);
        assert!(back.length() < 1e-6);
    }

    #[test]
    fn test_parent_mutation_invalidates_children() {
        let mut h = TransformHierarchy::new();
        let root = h.add(Transform::default(), None).unwrap();
        let child = h.add(Transform::from_translation(Vec3::Y), Some(root)).unwrap();
        let other = h.add(Transform::default(), None).unwrap();
        h.update();
        assert!(!h.is_dirty(child));

        h.set_local(root, Transform::from_translation(Vec3::X)).unwrap();
        assert!(h.is_dirty(child));
        assert!(!h.is_dirty(other));

        let changed = h.update();
        assert_eq!(changed, vec![root, child]);
        let p = h.world(child).transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(1.0, 1.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_setting_same_transform_is_not_a_change() {
        let mut h = TransformHierarchy::new();
        let root = h.add(Transform::default(), None).unwrap();
        h.update();

        h.set_local(root, Transform::default()).unwrap();
        assert!(h.update().is_empty());
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut h = TransformHierarchy::new();
        let err = h.add(Transform::default(), Some(3)).unwrap_err();
        assert_eq!(err, HierarchyError::UnknownParent { parent: 3, len: 0 });
        assert_eq!(h.set_local(9, Transform::default()), Err(HierarchyError::UnknownNode(9)));
    }
}
