pub mod generator;
pub mod particles;

pub use generator::*;
pub use particles::*;
