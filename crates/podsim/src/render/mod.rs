mod buffer;
mod convert;
mod funcs;
mod renderer;

pub use buffer::*;
pub use funcs::*;
pub use renderer::*;
