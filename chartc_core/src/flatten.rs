//! Flattening of a hierarchical state chart into a flat state machine.
//!
//! Flat states are *configurations*: sets of simultaneously active leaf states.
//! Without parallel states every configuration is a single leaf,
//! and is named after it.
//! Below a parallel state, configurations are the product of those of its regions,
//! and are named by joining their leaves with [`CONFIGURATION_SEPARATOR`].
//!
//! The transition table is total: every state reacts to every event,
//! staying put unless a transition is declared on one of its leaves or their ancestors.
//! The closest declaration wins.
//!
//! ```
//! # use chartc_core::{CompileOptions, flatten::flatten, model::*};
//! let root = StateNode::composite(
//!     "Idle",
//!     Some("Stopped"),
//!     vec![
//!         StateNode::simple("Stopped").with_transition(Transition::on("start", "Running")),
//!         StateNode::simple("Running").with_transition(Transition::on("stop", "Stopped")),
//!     ],
//! );
//! let model = MachineModel::new("motor", root);
//! let flat = flatten(&model, &CompileOptions::default()).expect("well-formed chart");
//!
//! assert_eq!(flat.state_names().collect::<Vec<_>>(), ["Stopped", "Running"]);
//! assert_eq!(flat.events(), ["start", "stop"]);
//! assert_eq!(flat.target("Stopped", "start"), Some("Running"));
//! // Undeclared pairs are self-loops
//! assert_eq!(flat.target("Stopped", "stop"), Some("Stopped"));
//! ```

mod chart;
mod step;

use crate::model::{Field, MachineModel, StateKind, Transition, TransitionKind, GUARD_TRUE};
use crate::options::{CompileOptions, EventlessPolicy};
use chart::Chart;
use hashbrown::{HashMap, HashSet};
use log::{info, trace, warn};
use smallvec::SmallVec;
use thiserror::Error;

/// Joins the leaf names of a parallel configuration.
pub const CONFIGURATION_SEPARATOR: &str = "__";

/// An indexing object for the states of the declared hierarchy.
///
/// Nodes are numbered in document order.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// An indexing object for the flat states of a [`FlattenedModel`].
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct StateId(usize);

impl StateId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// An indexing object for the events of a [`FlattenedModel`].
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventId(usize);

impl EventId {
    pub fn index(self) -> usize {
        self.0
    }
}

pub(crate) type Leaves = SmallVec<[NodeId; 4]>;

/// The error type for flattening a [`MachineModel`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlattenError {
    /// Two states declare the same id.
    #[error("state id `{0}` is declared more than once")]
    DuplicateStateId(String),
    /// A composite state with several children does not say which one is initial.
    #[error("composite state `{0}` has several children but no initial one")]
    MissingInitialChild(String),
    /// The initial child of a composite state is not one of its children.
    #[error("initial state `{initial}` of `{state}` is not one of its children")]
    InvalidInitialChild { state: String, initial: String },
    /// The initial child of a composite state is the state itself or one of its ancestors.
    #[error("initial state `{initial}` of `{state}` leads back to `{state}`")]
    InitialCycle { state: String, initial: String },
    /// The machine's initial state does not exist.
    #[error("initial state `{0}` does not exist")]
    UnknownInitial(String),
    /// A state's kind does not match its content.
    #[error("state `{state}` is malformed: {reason}")]
    InvalidStructure { state: String, reason: &'static str },
    /// A transition goes from one region of a parallel state to another.
    #[error("transition from `{state}` to `{target}` crosses regions of parallel state `{parallel}`")]
    CrossRegionTransition {
        state: String,
        target: String,
        parallel: String,
    },
    /// Transitions selected at the same time in different regions exit the same states.
    #[error("conflicting transitions in state `{state}` on event `{event}`")]
    ConflictingTransitions { state: String, event: String },
    /// Transitions selected at the same time in different regions are guarded.
    #[error("guarded transitions fire together in state `{state}` on event `{event}`")]
    AmbiguousGuards { state: String, event: String },
    /// Parallel composition yields more flat states than allowed.
    #[error("state `{state}` has more than {limit} configurations")]
    TooManyStates { state: String, limit: usize },
    /// An eventless transition was found, but eventless transitions are rejected.
    #[error("eventless transition of state `{state}` has no resolved kind")]
    UnresolvedTransitionKind { state: String },
}

/// A state of the declared hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatNode {
    /// Canonical id.
    pub id: String,
    pub kind: StateKind,
    pub parent: Option<NodeId>,
    pub depth: usize,
    pub children: Vec<NodeId>,
    pub on_entry: Vec<String>,
    pub on_exit: Vec<String>,
}

/// A flat state, i.e., a configuration of active leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatState {
    pub name: String,
    /// Active leaves, in document order.
    pub leaves: Vec<NodeId>,
}

/// A declared transition taking part in a [`Step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired {
    /// The state declaring the transition.
    pub source: NodeId,
    /// Declared target id, `None` for targetless transitions.
    pub target: Option<String>,
    pub kind: TransitionKind,
}

/// Reaction of a flat state to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Declared transitions this step is made of; empty for the implicit self-loop.
    pub fired: Vec<Fired>,
    /// Opaque guard; when it does not hold, the step does not happen.
    pub guard: String,
    /// Next state, `None` if a target could not be resolved.
    pub next: Option<StateId>,
    /// States exited, innermost first.
    pub exit: Vec<NodeId>,
    /// States entered, outermost first.
    pub entry: Vec<NodeId>,
}

impl Step {
    fn stay(state: StateId) -> Self {
        Step {
            fired: Vec::new(),
            guard: GUARD_TRUE.to_string(),
            next: Some(state),
            exit: Vec::new(),
            entry: Vec::new(),
        }
    }

    /// Whether the step is the implicit self-loop of an unhandled event.
    pub fn is_implicit(&self) -> bool {
        self.fired.is_empty()
    }
}

/// Completion condition of a parallel state.
///
/// Recorded only: no transition is driven by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelCompletion {
    pub state: NodeId,
    /// Final children of every region.
    pub finals: Vec<Vec<NodeId>>,
    /// Flat states in which every region has reached one of its final children.
    pub done: Vec<StateId>,
}

/// Data of the machine passed through the compiler untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineInfo {
    pub name: String,
    pub prefix: String,
    pub fields: Vec<Field>,
    pub callbacks: Vec<String>,
    pub header: String,
    pub source: String,
}

/// The compiler's output: a flat, total state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenedModel {
    pub(crate) machine: MachineInfo,
    pub(crate) nodes: Vec<FlatNode>,
    // Every declared transition with its source, shadowed ones included
    pub(crate) declared: Vec<(NodeId, Transition)>,
    pub(crate) states: Vec<FlatState>,
    pub(crate) events: Vec<String>,
    // Indexed by state, then event
    pub(crate) table: Vec<Vec<Step>>,
    // Indexed by state
    pub(crate) eventless: Vec<Option<Step>>,
    pub(crate) initial_state: StateId,
    pub(crate) initial_entry: Vec<NodeId>,
    pub(crate) completions: Vec<ParallelCompletion>,
}

impl FlattenedModel {
    pub fn machine(&self) -> &MachineInfo {
        &self.machine
    }

    pub fn nodes(&self) -> &[FlatNode] {
        &self.nodes
    }

    pub fn node(&self, node: NodeId) -> &FlatNode {
        &self.nodes[node.0]
    }

    /// Every transition of the declared hierarchy, with the state declaring it.
    pub fn declared_transitions(&self) -> &[(NodeId, Transition)] {
        &self.declared
    }

    pub fn states(&self) -> &[FlatState] {
        &self.states
    }

    pub fn state(&self, state: StateId) -> &FlatState {
        &self.states[state.0]
    }

    pub fn state_ids(&self) -> impl Iterator<Item = StateId> + '_ {
        (0..self.states.len()).map(StateId)
    }

    pub fn state_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.states.iter().map(|state| state.name.as_str())
    }

    pub fn state_by_name(&self, name: &str) -> Option<StateId> {
        self.states
            .iter()
            .position(|state| state.name == name)
            .map(StateId)
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }

    pub fn event_ids(&self) -> impl Iterator<Item = EventId> + '_ {
        (0..self.events.len()).map(EventId)
    }

    pub fn event_by_name(&self, name: &str) -> Option<EventId> {
        self.events.iter().position(|event| event == name).map(EventId)
    }

    pub fn event(&self, event: EventId) -> &str {
        &self.events[event.0]
    }

    /// The reaction of `state` to `event`. Defined for every pair.
    pub fn step(&self, state: StateId, event: EventId) -> &Step {
        &self.table[state.0][event.0]
    }

    /// The eventless step taken right after entering `state`, if any.
    pub fn eventless(&self, state: StateId) -> Option<&Step> {
        self.eventless[state.0].as_ref()
    }

    /// Name of the state reached from `state` on `event`, looked up by names.
    pub fn target(&self, state: &str, event: &str) -> Option<&str> {
        let state = self.state_by_name(state)?;
        let event = self.event_by_name(event)?;
        self.step(state, event)
            .next
            .map(|next| self.state(next).name.as_str())
    }

    pub fn initial_state(&self) -> StateId {
        self.initial_state
    }

    /// States entered when the machine starts, outermost first.
    pub fn initial_entry(&self) -> &[NodeId] {
        &self.initial_entry
    }

    pub fn completions(&self) -> &[ParallelCompletion] {
        &self.completions
    }

    /// Names of the hierarchy states in `chain`.
    pub fn chain_names<'a>(&'a self, chain: &'a [NodeId]) -> impl Iterator<Item = &'a str> + 'a {
        chain.iter().map(|node| self.node(*node).id.as_str())
    }
}

/// Flattens `model` into a [`FlattenedModel`].
///
/// Compilation is all-or-nothing: the first structural error aborts it.
/// Transitions towards unknown targets are not structural errors:
/// they are recorded with no next state and are reported by [`crate::validate`].
pub fn flatten(model: &MachineModel, options: &CompileOptions) -> Result<FlattenedModel, FlattenError> {
    info!(target: "flatten", "flattening machine '{}'", model.name);
    let chart = Chart::build(model)?;
    check_transitions(&chart, options.eventless)?;

    let mut states = Vec::new();
    let mut index: HashMap<Leaves, StateId> = HashMap::new();
    let mut names: HashSet<String> = HashSet::new();
    for leaves in chart.configurations(chart.root(), options.max_states)? {
        let name = leaves
            .iter()
            .map(|leaf| chart.node(*leaf).id.as_str())
            .collect::<Vec<_>>()
            .join(CONFIGURATION_SEPARATOR);
        trace!(target: "flatten", "flat state '{name}'");
        // A declared id may spell out a joined configuration name
        if !names.insert(name.clone()) {
            return Err(FlattenError::DuplicateStateId(name));
        }
        index.insert(leaves.clone(), StateId(states.len()));
        states.push((name, leaves));
    }
    info!(target: "flatten", "{} flat states", states.len());

    let events = collect_events(&chart);
    info!(target: "flatten", "{} events", events.len());

    let mut table = Vec::with_capacity(states.len());
    let mut eventless = Vec::with_capacity(states.len());
    for (idx, (_, leaves)) in states.iter().enumerate() {
        let state = StateId(idx);
        let mut row = Vec::with_capacity(events.len());
        for event in &events {
            let step = chart
                .step(leaves, Some(event.as_str()), &index)?
                .unwrap_or_else(|| Step::stay(state));
            row.push(step);
        }
        table.push(row);
        eventless.push(match options.eventless {
            EventlessPolicy::Immediate => chart.step(leaves, None, &index)?,
            EventlessPolicy::Reject | EventlessPolicy::Ignore => None,
        });
    }

    let start = match &model.initial {
        Some(initial) => chart
            .lookup(initial)
            .ok_or_else(|| FlattenError::UnknownInitial(initial.clone()))?,
        None => chart.root(),
    };
    let initial_entry = chart.entry_set(step::Domain::Root, start);
    let mut initial_leaves: Leaves = initial_entry
        .iter()
        .copied()
        .filter(|node| matches!(chart.kind(*node), StateKind::Simple | StateKind::Final))
        .collect();
    initial_leaves.sort();
    let initial_state = index
        .get(&initial_leaves)
        .copied()
        .ok_or_else(|| FlattenError::UnknownInitial(chart.node(start).id.clone()))?;

    let completions = completions(&chart, &states, &index);
    let declared = chart
        .transitions
        .iter()
        .enumerate()
        .flat_map(|(idx, transitions)| {
            transitions
                .iter()
                .map(move |transition| (NodeId(idx), transition.clone()))
        })
        .collect();

    Ok(FlattenedModel {
        machine: MachineInfo {
            name: model.name.clone(),
            prefix: model.prefix.clone(),
            fields: model.fields.clone(),
            callbacks: model.callbacks.clone(),
            header: model.header.clone(),
            source: model.source.clone(),
        },
        nodes: chart.nodes,
        declared,
        states: states
            .into_iter()
            .map(|(name, leaves)| FlatState {
                name,
                leaves: leaves.into_vec(),
            })
            .collect(),
        events,
        table,
        eventless,
        initial_state,
        initial_entry,
        completions,
    })
}

// Structural checks on every declared transition,
// including those shadowed in every configuration.
fn check_transitions(chart: &Chart<'_>, policy: EventlessPolicy) -> Result<(), FlattenError> {
    for (idx, transitions) in chart.transitions.iter().enumerate() {
        let source = NodeId(idx);
        for transition in transitions.iter() {
            if transition.event.is_none() {
                match policy {
                    EventlessPolicy::Reject => {
                        return Err(FlattenError::UnresolvedTransitionKind {
                            state: chart.node(source).id.clone(),
                        });
                    }
                    EventlessPolicy::Ignore => {
                        warn!(target: "flatten", "ignoring eventless transition of state '{}'", chart.node(source).id);
                    }
                    EventlessPolicy::Immediate => {}
                }
            }
            if let Some(target) = transition.target.as_deref().and_then(|t| chart.lookup(t)) {
                chart.domain(source, target, transition.kind)?;
            }
        }
    }
    Ok(())
}

// Events in declaration order, without repetitions.
fn collect_events(chart: &Chart<'_>) -> Vec<String> {
    let mut events: Vec<String> = Vec::new();
    for transitions in &chart.transitions {
        for event in transitions.iter().filter_map(|t| t.event.as_ref()) {
            if !events.contains(event) {
                events.push(event.clone());
            }
        }
    }
    events
}

fn completions(
    chart: &Chart<'_>,
    states: &[(String, Leaves)],
    index: &HashMap<Leaves, StateId>,
) -> Vec<ParallelCompletion> {
    chart
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| node.kind == StateKind::Parallel)
        .map(|(idx, node)| {
            let finals: Vec<Vec<NodeId>> = node
                .children
                .iter()
                .map(|region| {
                    chart
                        .node(*region)
                        .children
                        .iter()
                        .copied()
                        .filter(|child| chart.kind(*child) == StateKind::Final)
                        .collect()
                })
                .collect();
            let done = states
                .iter()
                .filter(|(_, leaves)| {
                    finals
                        .iter()
                        .all(|region| region.iter().any(|leaf| leaves.contains(leaf)))
                })
                .filter_map(|(_, leaves)| index.get(leaves).copied())
                .collect();
            ParallelCompletion {
                state: NodeId(idx),
                finals,
                done,
            }
        })
        .collect()
}
