//! A reference-counted, frame-driven asset cache.
//!
//! # Features
//! - **Load Once**: Every path is resolved at most once and shared; concurrent
//!   async loads of the same content are deduplicated.
//! - **Reference Counting**: Each asset counts the consumers that still need it.
//!   Unreferenced assets are evicted after a grace period measured in frames.
//! - **Bundles**: Assets can live in archives with inter-archive dependencies,
//!   opened on demand and unloaded once nothing depends on them.
//! - **Requests**: Tagged groups of loads executed by a background driver with a
//!   synchronous, batch or sequential strategy.
//! - **Explicit Scheduling**: All background work is a future polled by a
//!   [`FrameScheduler`] (or any [`TaskSpawner`]) once per frame.
//! - **Observability**: Exposes metrics and a human-readable dump.

// Public modules that form the API
pub mod builder;
pub mod bundle;
pub mod config;
pub mod error;
pub mod frame;
pub mod handles;
pub mod listener;
pub mod metrics;
pub mod owner;
pub mod queue;
pub mod request;
pub mod runtime;

// Internal, crate-only modules
mod entry;
mod pending;
mod shared;
mod source;
mod store;
mod task;

// Re-export the primary user-facing types for convenience
pub use builder::CacheBuilder;
pub use bundle::{
  Archive, ArchiveStore, BundleCounts, BundleLoader, BundlePath, DependencyManifest, NoBundles, PathResolver,
  StaticManifest,
};
pub use config::CacheConfig;
pub use entry::AssetId;
pub use error::{ArchiveError, BuildError, BundleError, LoadError, RequestError};
pub use frame::FrameClock;
pub use handles::AssetCache;
pub use listener::{EvictionListener, EvictionReason};
pub use metrics::MetricsSnapshot;
pub use owner::AssetOwner;
pub use queue::LoadStrategy;
pub use request::{Request, Task};
#[cfg(feature = "tokio")]
pub use runtime::TokioSpawner;
pub use runtime::{BoxedTask, FrameScheduler, TaskSpawner};
pub use source::ByteSource;
