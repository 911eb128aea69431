mod pool;
mod range;
#[cfg(test)]
mod tests;

pub use pool::*;
pub use range::*;
