// ABOUTME: Platform backend implementations.
// ABOUTME: Each backend implements the Platform and Connection traits.

pub mod mock;
