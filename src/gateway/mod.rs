//! Thin, uniform call layer over the three Google Business Profile API
//! surfaces. Attaches bearer tokens, classifies HTTP failures into the error
//! taxonomy, and applies transient-only retry to idempotent reads.

mod client;

pub use client::{GbpClient, Surface, classify_response};
