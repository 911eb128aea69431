mod dispatcher;
mod pending;

pub use dispatcher::*;
