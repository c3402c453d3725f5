//! chartc compiles hierarchical state charts into flat, total state machines.
//!
//! The pipeline is single-pass:
//!
//! - the XML front end ([`chartc_fmt_xml`]) loads a generic tree and parses it into a model;
//! - the core ([`chartc_core`]) flattens composite and parallel states,
//!   validates the result and produces the [`Emission`] handed to a renderer.

mod cli;

pub use chartc_core;
pub use chartc_fmt_xml;
pub use cli::Cli;

use anyhow::Context;
use chartc_core::model::MachineModel;
use chartc_core::{CompileOptions, Emission, ValidationReport, flatten, validate};
use log::info;
use std::path::Path;

/// Outcome of a successful compilation.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub emission: Emission,
    /// Non-fatal findings of validation.
    pub report: ValidationReport,
}

/// Compiles the machine in the XML file at `path`.
pub fn compile(path: &Path, options: &CompileOptions) -> anyhow::Result<Compiled> {
    let model = chartc_fmt_xml::load(path)?;
    compile_model(&model, options)
        .with_context(|| format!("failed to compile machine in '{}'", path.display()))
}

/// Compiles a machine already parsed into a [`MachineModel`].
pub fn compile_model(model: &MachineModel, options: &CompileOptions) -> anyhow::Result<Compiled> {
    let flat = flatten(model, options)
        .with_context(|| format!("failed to flatten machine '{}'", model.name))?;
    let report = validate(&flat, options)
        .with_context(|| format!("failed to validate machine '{}'", model.name))?;
    let emission = Emission::new(&flat)?;
    info!(
        "compiled machine '{}': {} states, {} events",
        model.name,
        emission.states.len(),
        emission.events.len()
    );
    Ok(Compiled { emission, report })
}
