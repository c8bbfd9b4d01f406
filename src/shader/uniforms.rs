use glam::{Mat3, Mat4};

use crate::config::{LightingSettings, UserUniforms};

/// Uniform block bound at `@group(0) @binding(0)` for every mesh program.
/// Field order and padding follow WGSL uniform layout rules.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub mvp: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
    pub light_pos: [f32; 4],
    pub ad_color: [f32; 4],
    pub specular_color: [f32; 4],
    pub ka: f32,
    pub kd: f32,
    pub ks: f32,
    pub shininess: f32,
    pub user_mat4: [[f32; 4]; 4],
    pub user_vec4: [f32; 4],
    pub user_vec3: [f32; 3],
    pub user_float: f32,
    pub user_int: i32,
    pub _pad: [i32; 3],
}

/// Size in bytes of the frame uniform block.
pub const FRAME_UNIFORMS_SIZE: u32 = std::mem::size_of::<FrameUniforms>() as u32;

impl FrameUniforms {
    pub fn new(mvp: Mat4, model: Mat4, lighting: &LightingSettings, user: &UserUniforms) -> Self {
        let [lx, ly, lz] = lighting.light_position;
        Self {
            mvp: mvp.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            normal: Mat4::from_mat3(normal_matrix(model)).to_cols_array_2d(),
            light_pos: [lx, ly, lz, 1.0],
            ad_color: lighting.ad_color,
            specular_color: lighting.specular_color,
            ka: lighting.ka,
            kd: lighting.kd,
            ks: lighting.ks,
            shininess: lighting.shininess,
            user_mat4: user.mat4,
            user_vec4: user.vec4,
            user_vec3: user.vec3,
            user_float: user.float,
            user_int: user.int,
            _pad: [0; 3],
        }
    }
}

/// Inverse-transpose of the upper 3×3, or identity when it is singular.
pub fn normal_matrix(model: Mat4) -> Mat3 {
    let m = Mat3::from_mat4(model);
    if m.determinant().abs() <= f32::EPSILON {
        return Mat3::IDENTITY;
    }
    m.inverse().transpose()
}

/// Uniform block of the flat-colour grid program.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FlatUniforms {
    pub mvp: [[f32; 4]; 4],
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_block_matches_wgsl_layout() {
        assert_eq!(FRAME_UNIFORMS_SIZE, 368);
        assert_eq!(std::mem::offset_of!(FrameUniforms, ka), 240);
        assert_eq!(std::mem::offset_of!(FrameUniforms, user_mat4), 256);
        assert_eq!(std::mem::offset_of!(FrameUniforms, user_vec3), 336);
        assert_eq!(std::mem::offset_of!(FrameUniforms, user_float), 348);
        assert_eq!(std::mem::offset_of!(FrameUniforms, user_int), 352);
    }

    #[test]
    fn test_normal_matrix_undoes_uniform_scale() {
        let model = Mat4::from_scale(Vec3::splat(2.0)) * Mat4::from_rotation_y(0.3);
        let n = normal_matrix(model) * Vec3::Y;
        assert!((n.normalize() - Vec3::Y).length() < 1e-5);
        assert_eq!(normal_matrix(Mat4::ZERO), Mat3::IDENTITY);
    }
}
