//! Shared fixtures for end-to-end reconciliation tests.

pub mod fixtures;
