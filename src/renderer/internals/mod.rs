/// "Internals" refers to thin owning wrappers over Vulkan objects. Each one releases what it
/// created when dropped.

pub mod buffer;
pub mod command;
pub mod image;
pub mod render_pass;
pub mod swapchain;
pub mod sync;
pub mod transfer_ctx;
