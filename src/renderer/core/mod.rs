/// "Core" refers to the long-lived objects the renderer is built on: the Vulkan instance,
/// the device and its queues, the window surface, and the swapchain-backed render target.

pub mod device;
pub mod instance;
pub mod queue;
pub mod surface;
pub mod target;
