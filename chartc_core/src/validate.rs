//! Cross-checks of a [`FlattenedModel`] before it is handed to a renderer.
//!
//! Unknown transition targets are fatal.
//! Everything else is reported as a [`ValidationWarning`]:
//! action and guard fragments are opaque text,
//! so the checks on their content are best-effort.

use crate::flatten::{FlattenedModel, StateId};
use crate::options::CompileOptions;
use hashbrown::HashSet;
use log::{info, warn};
use std::collections::VecDeque;
use thiserror::Error;

/// Members of the generated machine structure that fragments may use without declaring them.
pub const BUILTIN_MEMBERS: [&str; 2] = ["state", "payload"];

/// Suffix of the member holding a callback's handler.
pub const HANDLER_SUFFIX: &str = "_handler";

/// Fatal outcome of validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A transition targets a state that does not exist.
    #[error("transition of state `{state}` on event `{event}` targets unknown state `{target}`")]
    UnknownTarget {
        state: String,
        event: String,
        target: String,
    },
    /// Warnings were found and are not tolerated.
    #[error("validation produced {0} warning(s)")]
    DeniedWarnings(usize),
}

/// Non-fatal finding of validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationWarning {
    /// A flat state cannot be reached from the initial state.
    #[error("state `{0}` is unreachable from the initial state")]
    UnreachableState(String),
    /// A fragment addresses a member of the machine that is not a declared field.
    #[error("state `{state}` uses undeclared field `{field}`")]
    UndeclaredField { state: String, field: String },
    /// A callback is never used by any fragment.
    #[error("callback `{0}` is never used")]
    UnusedCallback(String),
}

/// Warnings collected by [`validate`], in a deterministic order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Validates a flattened model.
///
/// Fails on the first unknown transition target,
/// or when warnings are found and `options.deny_warnings` is set.
pub fn validate(
    model: &FlattenedModel,
    options: &CompileOptions,
) -> Result<ValidationReport, ValidationError> {
    info!(target: "validate", "validating machine '{}'", model.machine().name);
    check_targets(model)?;

    let mut report = ValidationReport::default();
    unreachable_states(model, &mut report);
    undeclared_fields(model, &options.field_accessor, &mut report);
    unused_callbacks(model, &mut report);

    for warning in &report.warnings {
        warn!(target: "validate", "{warning}");
    }
    info!(target: "validate", "{} warning(s)", report.warnings.len());
    if options.deny_warnings && !report.is_clean() {
        return Err(ValidationError::DeniedWarnings(report.warnings.len()));
    }
    Ok(report)
}

fn check_targets(model: &FlattenedModel) -> Result<(), ValidationError> {
    let known: HashSet<&str> = model.nodes().iter().map(|node| node.id.as_str()).collect();
    for (source, transition) in model.declared_transitions() {
        if let Some(target) = &transition.target {
            if !known.contains(target.as_str()) {
                return Err(ValidationError::UnknownTarget {
                    state: model.node(*source).id.clone(),
                    event: transition.event.clone().unwrap_or_default(),
                    target: target.clone(),
                });
            }
        }
    }
    Ok(())
}

// Breadth-first search from the initial state over events and eventless steps.
fn unreachable_states(model: &FlattenedModel, report: &mut ValidationReport) {
    let mut reached = vec![false; model.states().len()];
    let mut queue = VecDeque::from([model.initial_state()]);
    reached[model.initial_state().index()] = true;
    while let Some(state) = queue.pop_front() {
        let successors = model
            .event_ids()
            .map(|event| model.step(state, event))
            .chain(model.eventless(state))
            .filter_map(|step| step.next);
        for next in successors {
            if !reached[next.index()] {
                reached[next.index()] = true;
                queue.push_back(next);
            }
        }
    }
    report.warnings.extend(
        model
            .state_ids()
            .filter(|state: &StateId| !reached[state.index()])
            .map(|state| ValidationWarning::UnreachableState(model.state(state).name.clone())),
    );
}

fn undeclared_fields(model: &FlattenedModel, accessor: &str, report: &mut ValidationReport) {
    if accessor.is_empty() {
        return;
    }
    let machine = model.machine();
    let declared: HashSet<String> = machine
        .fields
        .iter()
        .map(|field| field.id.clone())
        .chain(BUILTIN_MEMBERS.iter().map(|member| member.to_string()))
        .chain(
            machine
                .callbacks
                .iter()
                .map(|callback| format!("{callback}{HANDLER_SUFFIX}")),
        )
        .collect();

    let mut seen = HashSet::new();
    let actions = model.nodes().iter().flat_map(|node| {
        node.on_entry
            .iter()
            .chain(&node.on_exit)
            .map(move |fragment| (node.id.as_str(), fragment.as_str()))
    });
    let guards = model
        .declared_transitions()
        .iter()
        .map(|(source, transition)| (model.node(*source).id.as_str(), transition.guard.as_str()));
    for (state, fragment) in actions.chain(guards) {
        for member in accessed_members(fragment, accessor) {
            if !declared.contains(member) && seen.insert((state, member)) {
                report.warnings.push(ValidationWarning::UndeclaredField {
                    state: state.to_string(),
                    field: member.to_string(),
                });
            }
        }
    }
}

fn unused_callbacks(model: &FlattenedModel, report: &mut ValidationReport) {
    let machine = model.machine();
    let mut used = HashSet::new();
    let fragments = model
        .nodes()
        .iter()
        .flat_map(|node| node.on_entry.iter().chain(&node.on_exit))
        .chain(
            model
                .declared_transitions()
                .iter()
                .map(|(_, transition)| &transition.guard),
        )
        .chain([&machine.header, &machine.source]);
    for fragment in fragments {
        used.extend(identifiers(fragment));
    }
    report.warnings.extend(
        machine
            .callbacks
            .iter()
            .filter(|callback| {
                !used.contains(callback.as_str())
                    && !used.contains(format!("{callback}{HANDLER_SUFFIX}").as_str())
            })
            .map(|callback| ValidationWarning::UnusedCallback(callback.clone())),
    );
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// Identifier directly following an occurrence of `accessor`.
fn accessed_members<'a>(fragment: &'a str, accessor: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    fragment.match_indices(accessor).filter_map(move |(pos, _)| {
        let rest = &fragment[pos + accessor.len()..];
        let end = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
        let member = &rest[..end];
        member
            .chars()
            .next()
            .is_some_and(is_ident_start)
            .then_some(member)
    })
}

fn identifiers(fragment: &str) -> impl Iterator<Item = &str> {
    fragment
        .split(|c: char| !is_ident_char(c))
        .filter(|word| word.chars().next().is_some_and(is_ident_start))
}
