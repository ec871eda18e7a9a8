pub mod buffer;
pub mod headless;
pub mod renderer;

pub use buffer::*;
pub use headless::*;
pub use renderer::*;
