pub mod convert;
pub mod detection;
pub mod export;
pub mod overlay;
pub mod pipeline;
pub mod pose;
pub mod runtime;
pub mod transform;
pub mod video;

// Re-export the top-level pipeline error type so callers only need `maskcam_core::Error`
pub use anyhow::Error;
pub use anyhow::Result;
