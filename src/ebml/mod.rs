//! EBML decoding: variable-length integers, element headers, the static
//! Matroska element table and the incremental tree builder.

pub mod document;
pub mod element;
pub mod tree;
pub mod vint;

pub use document::{AudioSettings, EbmlHeader, MatroskaDocument, SegmentInfo, TrackEntry, TrackType};
pub use element::{ElementHeader, ElementKind, ElementSpec, Parent};
pub use tree::{ParseEvent, TreeBuilder};
pub use vint::{Decoded, ElementSize};
