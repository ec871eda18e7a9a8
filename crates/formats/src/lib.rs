pub mod histogram;
pub mod nodes;
pub mod region;

pub use histogram::*;
pub use nodes::*;
pub use region::*;
