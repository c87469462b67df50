pub mod path;
pub mod sequence;

pub use path::*;
pub use sequence::*;
