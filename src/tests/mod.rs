//! Integration testing module
//!
//! End-to-end tests for the normalizer:
//! - Single-file duration and rate normalization
//! - Batch runs, fault isolation and worker-count independence
