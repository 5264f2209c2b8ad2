/// Interface shared by the list implementations
pub mod ifaces;
/// Globally locked baseline list
pub mod locked;
/// Lock-free list over markable links
pub mod lockfree;

/// Prelude for the list implementations
pub mod prelude {
    pub use super::ifaces::*;
    pub use super::locked::*;
    pub use super::lockfree::*;
}
