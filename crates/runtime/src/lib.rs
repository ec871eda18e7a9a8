pub mod epoch;

pub use epoch::*;
