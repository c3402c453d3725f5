//! XML front end of the state-chart compiler.
//!
//! Text is first loaded into a generic [`Element`] tree,
//! which is then parsed into a [`MachineModel`].

mod parser;
mod tree;

pub use chartc_core;
use chartc_core::model::MachineModel;
pub use parser::*;
pub use tree::*;

use anyhow::Context;
use log::info;
use std::path::Path;

/// Loads the machine described in the XML file at `path`.
pub fn load(path: &Path) -> anyhow::Result<MachineModel> {
    info!(target: "parser", "reading file '{}'", path.display());
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read file '{}'", path.display()))?;
    parse_str(&text).with_context(|| format!("failed to parse machine in '{}'", path.display()))
}

/// Parses the machine described by XML `text`.
pub fn parse_str(text: &str) -> anyhow::Result<MachineModel> {
    let tree = Element::parse_str(text)?;
    parse(&tree)
}
