//! Integration test crate for the IPCore engine.
//!
//! This crate exists solely to hold cross-crate integration tests that
//! build whole graphs out of the node catalogue and check their ranges,
//! image trees, identifiers and audio.

#[cfg(test)]
mod support;

#[cfg(test)]
mod ranges;

#[cfg(test)]
mod evaluation;

#[cfg(test)]
mod audio;

#[cfg(test)]
mod color;
