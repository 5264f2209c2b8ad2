/// Markable atomic links
pub mod atomics;

///
/// Prelude for the synchronization primitives
pub mod prelude {
    pub use super::atomics::*;
}
