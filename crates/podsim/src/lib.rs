//! Concurrency and shared-resource primitives for simulating large fleets of
//! virtual nodes and pods.
//!
//! The crate exposes five independent building blocks that a controller
//! composes per reconciled object:
//!
//! - [`Dispatcher`]: bounded, elastic execution of submitted work items.
//! - [`AddrPool`]: allocation and recycling of unique addresses from an
//!   [`AddrRange`].
//! - [`Renderer`]: Go-style template rendering of structured state into a
//!   canonical JSON patch document.
//! - [`ConcurrentSet`] and [`SharedCache`]: reader/writer guarded containers
//!   for cross-reconcile coordination.
//!
//! None of them depend on each other, and none hold a lock while calling into
//! another.

mod addr;
mod dispatch;
mod error;
mod lock;
mod render;
mod sync;

pub use crate::addr::*;
pub use crate::dispatch::*;
pub use crate::error::*;
pub use crate::render::*;
pub use crate::sync::*;
