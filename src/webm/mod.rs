//! WebM block layer: block headers and lacing.

pub mod block;
pub mod fixture;
pub mod lacing;

pub use block::Block;
pub use lacing::Lacing;
