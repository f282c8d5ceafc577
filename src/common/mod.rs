//! Helpers shared by the compound file engine.
//!
//! Binary field codecs and format sniffing live here so that the `ole` module
//! only deals with container structure.

// Submodule declarations
pub mod binary;
pub mod detection;

// Re-exports for convenience
pub use detection::FileMagic;
