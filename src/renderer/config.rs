use std::path::PathBuf;
use crate::renderer::resources::mesh::Mesh;

/// Contains configuration options for the renderer like the window size, asset paths, and
/// validation settings
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub window_title: String,
    pub window_size: (u32, u32),

    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub texture: PathBuf,
    pub mesh: Mesh,

    pub clear_color: [f32; 4],

    /// Enables the Khronos validation layer and routes its messages into the logger
    pub validation: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            window_title: "quadra".into(),
            window_size: (800, 600),

            vertex_shader: "shaders-built/quad.vert.spv".into(),
            fragment_shader: "shaders-built/quad.frag.spv".into(),
            texture: "textures/checker.png".into(),
            mesh: Mesh::quad(),

            clear_color: [0.0, 0.0, 0.0, 1.0],

            validation: cfg!(debug_assertions),
        }
    }
}
