//! Format-independent core of a state-chart compiler.
//!
//! A [`model::MachineModel`] describes a hierarchical state chart
//! with composite and parallel states.
//! [`flatten::flatten`] turns it into a flat, total state machine
//! together with the exit and entry chains of every transition,
//! [`validate::validate`] cross-checks the result,
//! and [`emission::Emission`] is the serializable view handed to a renderer.

#![forbid(unsafe_code)]

pub mod emission;
pub mod flatten;
pub mod model;
mod options;
pub mod validate;

pub use emission::Emission;
pub use flatten::{FlattenError, FlattenedModel, flatten};
pub use options::*;
pub use validate::{ValidationError, ValidationReport, ValidationWarning, validate};
