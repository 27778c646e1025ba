use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Differences below this are treated as "not edited"
pub const EDIT_EPSILON: f32 = 0.00001;

/// Per-bone override: translation, Euler rotation in degrees and scaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoneTransform {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scaling: Vec3,
}

impl Default for BoneTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl BoneTransform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Vec3::ZERO,
        scaling: Vec3::ONE,
    };

    pub fn new(translation: Vec3, rotation: Vec3, scaling: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scaling,
        }
    }

    /// True if any component differs from the identity transform
    pub fn is_edited(&self) -> bool {
        !self
            .translation
            .abs_diff_eq(Vec3::ZERO, EDIT_EPSILON)
            || !self.rotation.abs_diff_eq(Vec3::ZERO, EDIT_EPSILON)
            || !self.scaling.abs_diff_eq(Vec3::ONE, EDIT_EPSILON)
    }

    /// Copy the values of `other` into this transform, keeping it in place.
    pub fn update_to_match(&mut self, other: &BoneTransform) {
        self.translation = other.translation;
        self.rotation = other.rotation;
        self.scaling = other.scaling;
    }

    pub fn reset(&mut self) {
        self.update_to_match(&Self::IDENTITY);
    }
}
