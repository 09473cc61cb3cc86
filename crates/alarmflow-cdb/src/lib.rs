//! Configuration store (CDB) of the alarmflow alarm system.
//!
//! The CDB is a tree of JSON documents describing the whole deployment:
//! global settings (`ias.json`), supervisors, the DASUs they deploy, the
//! ASCEs composing each DASU, the IASIO type catalog, the transfer
//! function catalog, and templates with their allowed instance bounds.
//!
//! The [`CdbReader`] trait hides the backend; [`JsonCdbReader`] is the
//! file-based implementation selected with `--jcdb <path>` on the
//! supervisor command line. Readers resolve references eagerly:
//! [`CdbReader::resolved_dasu`] returns a [`DasuDefinition`] with every
//! transitive child (ASCEs, IASIOs, transfer functions) inlined, ready
//! to instantiate a distributed unit without further lookups.
//!
//! Topology is fixed at start: nothing in this crate supports mutation
//! or re-reading while the system runs.

mod error;
mod models;
mod reader;

pub use error::CdbError;
pub use models::{
    AsceConfig, AsceDefinition, DasuConfig, DasuDefinition, DasuToDeploy, IasConfig, IasioConfig,
    Property, SupervisorConfig, TemplateConfig, TransferFunctionConfig,
};
pub use reader::{CdbReader, JsonCdbReader};
