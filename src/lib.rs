//! Capability negotiation with ffmpeg and fallback-driven media conversion.
//!
//! The [`engine`] module discovers what the installed ffmpeg can really do on
//! this host and converts files by walking a ranked plan of codec
//! combinations until one produces output.

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;

pub use error::{ConvertError, Result};
