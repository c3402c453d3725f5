use crate::compile;
use anyhow::Context;
use chartc_core::{CompileOptions, DEFAULT_MAX_STATES, EventlessPolicy};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// How transitions without a triggering event are compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Eventless {
    /// Reject them as errors
    Reject,
    /// Drop them
    Ignore,
    /// Fire them as soon as their source state is entered
    Immediate,
}

impl From<Eventless> for EventlessPolicy {
    fn from(value: Eventless) -> Self {
        match value {
            Eventless::Reject => EventlessPolicy::Reject,
            Eventless::Ignore => EventlessPolicy::Ignore,
            Eventless::Immediate => EventlessPolicy::Immediate,
        }
    }
}

/// A compiler from hierarchical state charts to flat state machines
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path of the machine's XML file
    #[arg(value_hint = clap::ValueHint::FilePath)]
    input: PathBuf,
    /// Write the JSON emission to this file instead of standard output
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    output: Option<PathBuf>,
    /// How transitions without event are compiled
    #[arg(long, value_enum, default_value_t = Eventless::Reject)]
    eventless: Eventless,
    /// Prefix through which fragments address the machine's fields
    #[arg(long, default_value = "machine->")]
    field_accessor: String,
    /// Treat validation warnings as errors
    #[arg(long, default_value = "false")]
    deny_warnings: bool,
    /// Largest number of flat states the machine may have
    #[arg(long, default_value_t = DEFAULT_MAX_STATES)]
    max_states: usize,
}

impl Cli {
    fn options(&self) -> CompileOptions {
        CompileOptions {
            eventless: self.eventless.into(),
            field_accessor: self.field_accessor.clone(),
            deny_warnings: self.deny_warnings,
            max_states: self.max_states,
        }
    }

    pub fn run(&self) -> anyhow::Result<()> {
        let compiled = compile(&self.input, &self.options())?;
        for warning in &compiled.report.warnings {
            eprintln!("WARNING: {warning}");
        }
        let json = serde_json::to_string_pretty(&compiled.emission)
            .context("failed to serialize emission")?;
        match &self.output {
            Some(path) => std::fs::write(path, json)
                .with_context(|| format!("failed to write file '{}'", path.display()))?,
            None => println!("{json}"),
        }
        Ok(())
    }
}
