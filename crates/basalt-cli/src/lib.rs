//! basalt CLI library - shared functionality for testing and binary.

pub mod dataset;
