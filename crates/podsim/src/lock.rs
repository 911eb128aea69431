pub(crate) use parking_lot::{Condvar, Mutex, RwLock};
