pub mod config;
pub mod country;
pub mod layer;
pub mod particle;
pub mod symbology;
pub mod translate;

pub use config::*;
pub use country::*;
pub use layer::*;
pub use particle::*;
pub use symbology::*;
pub use translate::*;
