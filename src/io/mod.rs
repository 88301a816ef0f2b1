//! Reading uploads: decompression and the two model encodings.
//!
//! - [`decompress`] turns an [`UploadedFile`](crate::core::UploadedFile) into bytes
//! - [`json`] and [`sbml`] build a [`Model`] from those bytes
//! - [`schema`] checks raw JSON documents against the COBRA layout
//! - [`xml`] is the element tree shared by the SBML loader and the structural checker

pub mod decompress;
pub mod json;
pub mod sbml;
pub mod schema;
pub mod xml;

use crate::model::Model;

pub use decompress::decompress;
pub use json::load_json;
pub use sbml::load_sbml;

/// A model together with the soft errors collected while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedModel {
    /// The constructed model.
    pub model: Model,
    /// Problems found during construction that did not prevent it.
    pub errors: Vec<String>,
}

impl LoadedModel {
    /// Wrap a model with no construction errors.
    pub fn new(model: Model) -> Self {
        Self {
            model,
            errors: Vec::new(),
        }
    }

    /// Attach construction errors.
    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }
}
