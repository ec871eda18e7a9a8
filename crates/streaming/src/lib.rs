pub mod cache;
pub mod pipeline;
pub mod protocol;
pub mod source;

pub use cache::*;
pub use pipeline::*;
pub use protocol::*;
pub use source::*;
