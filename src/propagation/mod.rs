//! Carrier interfaces for trace-context propagation.
//!
//! Propagation encodes a [`TraceContext`] into transport headers on the way
//! out and decodes it on the way in. The carrier is abstracted behind the
//! [`Injector`] and [`Extractor`] traits so that any header map (an HTTP
//! request, a message envelope, a plain `HashMap`) can participate.
//!
//! [`TraceContext`]: crate::context::TraceContext

use std::collections::HashMap;

mod b3;

pub use b3::{
    B3Propagator, B3_PARENT_SPAN_ID_HEADER, B3_SAMPLED_HEADER, B3_SPAN_ID_HEADER,
    B3_TRACE_ID_HEADER,
};

/// Injector provides an interface for adding fields to an underlying struct
/// like `HashMap`.
pub trait Injector {
    /// Add a key and value to the underlying data.
    fn set(&mut self, key: &str, value: String);
}

/// Extractor provides an interface for reading fields from an underlying
/// struct like `HashMap`.
pub trait Extractor {
    /// Get a value for a key from the underlying data.
    fn get(&self, key: &str) -> Option<&str>;

    /// Collect all the keys from the underlying data.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key from the HashMap.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    /// Collect all the keys from the HashMap.
    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect::<Vec<_>>()
    }
}
