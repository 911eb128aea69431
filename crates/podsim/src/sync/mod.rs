mod cache;
mod set;

pub use cache::*;
pub use set::*;
