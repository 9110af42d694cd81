//! Integration test crate for stackscope.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on the full stack to verify the pieces work together.

#[cfg(test)]
mod loading;

#[cfg(test)]
mod session;

#[cfg(test)]
mod persistence;
