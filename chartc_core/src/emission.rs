//! The read-only view of a flattened machine handed to a renderer.
//!
//! Everything is named: states, events and hierarchy states are referred to by their names,
//! so the serialized form is self-contained.

use crate::flatten::{FlattenedModel, NodeId, Step};
use crate::model::{Field, StateKind};
use crate::validate::ValidationError;
use serde::Serialize;

/// Reaction of a flat state to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmittedTransition {
    pub target: String,
    pub guard: String,
    /// Hierarchy states whose exit actions run, in order.
    pub exit: Vec<String>,
    /// Hierarchy states whose entry actions run, in order.
    pub entry: Vec<String>,
}

/// Action fragments of a hierarchy state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateActions {
    pub state: String,
    pub kind: StateKind,
    pub parent: Option<String>,
    pub on_entry: Vec<String>,
    pub on_exit: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmittedCompletion {
    /// The parallel state.
    pub state: String,
    /// Flat states in which every region is in a final state.
    pub done: Vec<String>,
}

/// Serializable description of a flat machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Emission {
    pub name: String,
    pub prefix: String,
    pub machine_type: String,
    pub state_type: String,
    pub event_type: String,
    pub states: Vec<String>,
    pub events: Vec<String>,
    pub initial: String,
    /// Hierarchy states entered at start-up.
    pub initial_entry: Vec<String>,
    /// Indexed by state, then by event, following `states` and `events`.
    pub transitions: Vec<Vec<EmittedTransition>>,
    /// Indexed by state.
    pub eventless: Vec<Option<EmittedTransition>>,
    pub actions: Vec<StateActions>,
    pub fields: Vec<Field>,
    /// Fields supplied when the machine is created, i.e., those without an initial value.
    pub arguments: Vec<String>,
    pub callbacks: Vec<String>,
    pub completions: Vec<EmittedCompletion>,
    pub header: String,
    pub source: String,
}

impl Emission {
    /// Builds the emission of a flattened model.
    ///
    /// Fails if a transition has no resolved target,
    /// which [`crate::validate::validate`] reports beforehand.
    pub fn new(model: &FlattenedModel) -> Result<Self, ValidationError> {
        let machine = model.machine();
        let names = |chain: &[NodeId]| -> Vec<String> {
            model.chain_names(chain).map(str::to_string).collect()
        };
        let emit = |state: &str, event: &str, step: &Step| -> Result<EmittedTransition, ValidationError> {
            let next = step.next.ok_or_else(|| ValidationError::UnknownTarget {
                state: state.to_string(),
                event: event.to_string(),
                target: step
                    .fired
                    .iter()
                    .filter_map(|fired| fired.target.clone())
                    .find(|target| model.nodes().iter().all(|node| &node.id != target))
                    .unwrap_or_default(),
            })?;
            Ok(EmittedTransition {
                target: model.state(next).name.clone(),
                guard: step.guard.clone(),
                exit: names(&step.exit),
                entry: names(&step.entry),
            })
        };

        let mut transitions = Vec::with_capacity(model.states().len());
        let mut eventless = Vec::with_capacity(model.states().len());
        for state in model.state_ids() {
            let name = model.state(state).name.as_str();
            let row = model
                .event_ids()
                .map(|event| emit(name, model.event(event), model.step(state, event)))
                .collect::<Result<Vec<_>, _>>()?;
            transitions.push(row);
            eventless.push(
                model
                    .eventless(state)
                    .map(|step| emit(name, "", step))
                    .transpose()?,
            );
        }

        let prefix = machine.prefix.clone();
        Ok(Emission {
            name: machine.name.clone(),
            machine_type: format!("{prefix}_t"),
            state_type: format!("{prefix}_state_t"),
            event_type: format!("{prefix}_event_t"),
            prefix,
            states: model.state_names().map(str::to_string).collect(),
            events: model.events().to_vec(),
            initial: model.state(model.initial_state()).name.clone(),
            initial_entry: names(model.initial_entry()),
            transitions,
            eventless,
            actions: model
                .nodes()
                .iter()
                .map(|node| StateActions {
                    state: node.id.clone(),
                    kind: node.kind,
                    parent: node.parent.map(|parent| model.node(parent).id.clone()),
                    on_entry: node.on_entry.clone(),
                    on_exit: node.on_exit.clone(),
                })
                .collect(),
            fields: machine.fields.clone(),
            arguments: machine
                .fields
                .iter()
                .filter(|field| field.init.is_none())
                .map(|field| field.id.clone())
                .collect(),
            callbacks: machine.callbacks.clone(),
            completions: model
                .completions()
                .iter()
                .map(|completion| EmittedCompletion {
                    state: model.node(completion.state).id.clone(),
                    done: completion
                        .done
                        .iter()
                        .map(|state| model.state(*state).name.clone())
                        .collect(),
                })
                .collect(),
            header: machine.header.clone(),
            source: machine.source.clone(),
        })
    }

    /// Index of a state in `states`.
    pub fn state_index(&self, name: &str) -> Option<usize> {
        self.states.iter().position(|state| state == name)
    }

    /// Index of an event in `events`.
    pub fn event_index(&self, name: &str) -> Option<usize> {
        self.events.iter().position(|event| event == name)
    }

    pub fn transition(&self, state: &str, event: &str) -> Option<&EmittedTransition> {
        Some(&self.transitions[self.state_index(state)?][self.event_index(event)?])
    }
}
