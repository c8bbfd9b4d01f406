use glam::{Mat4, Vec3};

/// Pitch is clamped to this many degrees either side of level.
pub const PITCH_LIMIT_DEGREES: f32 = 90.0;

/// Scale, rotation and translation of the displayed model.
///
/// Angles are stored in degrees. Yaw is unbounded; pitch is kept within
/// `[-90, 90]` by every mutator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformState {
    pub scale: Mat4,
    yaw: f32,
    pitch: f32,
    pub translation: Mat4,
}

impl Default for TransformState {
    fn default() -> Self {
        Self {
            scale: Mat4::IDENTITY,
            yaw: 0.0,
            pitch: 0.0,
            translation: Mat4::IDENTITY,
        }
    }
}

impl TransformState {
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn set_yaw(&mut self, degrees: f32) {
        self.yaw = degrees;
    }

    pub fn set_pitch(&mut self, degrees: f32) {
        self.pitch = degrees.clamp(-PITCH_LIMIT_DEGREES, PITCH_LIMIT_DEGREES);
    }

    pub fn add_yaw(&mut self, degrees: f32) {
        self.yaw += degrees;
    }

    pub fn add_pitch(&mut self, degrees: f32) {
        self.set_pitch(self.pitch + degrees);
    }

    /// Multiply the current scale uniformly by `factor`.
    pub fn scale_by(&mut self, factor: f32) {
        self.scale *= Mat4::from_scale(Vec3::splat(factor));
    }

    /// Translate in the model's parent frame.
    pub fn translate(&mut self, offset: Vec3) {
        self.translation *= Mat4::from_translation(offset);
    }

    /// Pitch about X applied after yaw about Y.
    pub fn rotation(&self) -> Mat4 {
        Mat4::from_rotation_x(self.pitch.to_radians()) * Mat4::from_rotation_y(self.yaw.to_radians())
    }

    /// `translation × rotation × scale`
    pub fn model_matrix(&self) -> Mat4 {
        self.translation * self.rotation() * self.scale
    }

    /// Uniform scale factor currently applied.
    pub fn scale_factor(&self) -> f32 {
        self.scale.x_axis.x
    }

    pub fn translation_offset(&self) -> Vec3 {
        self.translation.w_axis.truncate()
    }
}
