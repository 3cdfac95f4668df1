/// "Resources" refers to the static data the renderer draws with. Created once at startup
/// and kept for the renderer's lifetime.

pub mod mesh;
pub mod pipeline;
pub mod shader;
pub mod texture;
pub mod vertex;
