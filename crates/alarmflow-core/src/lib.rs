//! Evaluation core of the alarmflow alarm system.
//!
//! A [`dasu::Dasu`] owns a set of [`asce::ComputingElement`]s wired into
//! an acyclic [`topology::AsceTopology`]. Input values arriving from the
//! bus are propagated level by level; each computing element runs its
//! [`transfer::TransferFunction`] over the typed inputs and the previous
//! output, and the DASU publishes its single designated output when it
//! changes, refreshing it periodically otherwise.
//!
//! The DASU is single-owner: every mutation of its buffers and elements
//! happens on one serialization task. The only suspension points are the
//! bus publisher and subscriber.

pub mod asce;
pub mod dasu;
pub mod stats;
pub mod topology;
pub mod transfer;

pub use asce::{AsceError, AsceState, ComputingElement};
pub use dasu::{Dasu, DasuError};
pub use topology::{AsceTopoEntry, AsceTopology, TopologyError};
pub use transfer::{
    PropertyBag, TransferError, TransferFunction, TransferFunctionRegistry, TransferResult,
    TransferSetup,
};
