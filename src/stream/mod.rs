//! Stream utilities for worker handle updates

mod sample;

pub use sample::{Sample, SampleExt};
