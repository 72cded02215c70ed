//! Stream distribution: publishing parts to any number of subscribers.
//!
//! ```text
//! ┌─────────────┐   publish   ┌──────────────┐   recv   ┌──────────────┐
//! │   Session   │────────────▶│ StreamRouter │─────────▶│ transcriber  │
//! │ (one writer)│             │  per stream  │─────────▶│ persistence  │
//! └─────────────┘             └──────────────┘─────────▶│ playback ... │
//!                                                        └──────────────┘
//! ```

pub mod router;

pub use router::{
    AudioStreamRouter, RetentionPolicy, Sequenced, StreamRouter, StreamStats, Subscription,
};
