//! Error types for configuration store access.

use std::path::PathBuf;

/// Errors raised while reading or resolving CDB documents.
#[derive(Debug, thiserror::Error)]
pub enum CdbError {
    /// The requested document does not exist in the store.
    #[error("{kind} '{id}' not found in the CDB")]
    NotFound {
        /// Document kind (e.g. "DASU", "ASCE").
        kind: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// A document could not be read from the backend.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path of the unreadable document.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A document is not valid JSON of the expected shape.
    #[error("malformed document {path}: {reason}")]
    Malformed {
        /// Path of the malformed document.
        path: PathBuf,
        /// Parser diagnostic.
        reason: String,
    },

    /// A templated DASU was deployed with an instance number outside
    /// the bounds declared by its template.
    #[error(
        "instance {instance} of template '{template_id}' outside allowed bounds [{min}, {max}]"
    )]
    InstanceOutOfBounds {
        /// The template id.
        template_id: String,
        /// The rejected instance number.
        instance: usize,
        /// Lowest allowed instance.
        min: usize,
        /// Highest allowed instance.
        max: usize,
    },

    /// A DASU deployment entry references a template but carries no
    /// instance number, or vice versa.
    #[error("DASU '{dasu_id}' deployment must carry both template and instance, or neither")]
    IncompleteTemplateRef {
        /// The DASU whose deployment entry is inconsistent.
        dasu_id: String,
    },
}
