//! Semantic model of a state chart, as produced by a front-end parser.
//!
//! The model is a strict ownership tree: a [`StateNode`] owns its children,
//! and nothing points back up.
//! Ancestor context is only ever reconstructed by the flattener while it walks the tree.
//!
//! ```
//! # use chartc_core::model::*;
//! let root = StateNode::composite(
//!     "Idle",
//!     Some("Stopped"),
//!     vec![
//!         StateNode::simple("Stopped").with_transition(Transition::on("start", "Running")),
//!         StateNode::simple("Running").with_transition(Transition::on("stop", "Stopped")),
//!     ],
//! );
//! let model = MachineModel::new("motor", root);
//! assert_eq!(model.prefix, "mch_motor");
//! ```

use serde::Serialize;

/// The guard text of an unconditional transition.
pub const GUARD_TRUE: &str = "true";

/// The kind of a state, closed under exhaustive matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    /// A state with no children.
    Simple,
    /// A state with children, exactly one of which is active at a time.
    Composite,
    /// A state whose children (regions) are all active at the same time.
    Parallel,
    /// A terminal state of its parent.
    Final,
}

/// Whether a transition targeting a descendant of its source leaves the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    /// The source is not exited when the target is one of its descendants.
    Internal,
    /// The source is always exited and re-entered.
    #[default]
    External,
}

/// A transition declared on a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Triggering event; `None` for an eventless transition.
    pub event: Option<String>,
    /// Target state id; `None` for a targetless self-loop placeholder.
    pub target: Option<String>,
    /// Opaque guard expression.
    pub guard: String,
    pub kind: TransitionKind,
}

impl Transition {
    /// An unguarded external transition triggered by `event`.
    pub fn on(event: impl Into<String>, target: impl Into<String>) -> Self {
        Transition {
            event: Some(event.into()),
            target: Some(target.into()),
            guard: GUARD_TRUE.to_string(),
            kind: TransitionKind::External,
        }
    }

    /// An unguarded external transition without triggering event.
    pub fn eventless(target: impl Into<String>) -> Self {
        Transition {
            event: None,
            target: Some(target.into()),
            guard: GUARD_TRUE.to_string(),
            kind: TransitionKind::External,
        }
    }

    /// A transition that handles `event` without changing state.
    pub fn targetless(event: impl Into<String>) -> Self {
        Transition {
            event: Some(event.into()),
            target: None,
            guard: GUARD_TRUE.to_string(),
            kind: TransitionKind::External,
        }
    }

    pub fn with_guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = guard.into();
        self
    }

    pub fn internal(mut self) -> Self {
        self.kind = TransitionKind::Internal;
        self
    }

    /// Whether the guard is trivially satisfied.
    pub fn is_unguarded(&self) -> bool {
        self.guard.trim() == GUARD_TRUE
    }
}

/// One declared state of the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateNode {
    /// Declared id, if any. Missing ids are made up by the flattener.
    pub id: Option<String>,
    pub kind: StateKind,
    /// Default child of a composite state.
    /// Can be omitted when the state has a single child.
    pub initial: Option<String>,
    pub children: Vec<StateNode>,
    /// Opaque entry action fragments, in firing order.
    pub on_entry: Vec<String>,
    /// Opaque exit action fragments, in firing order.
    pub on_exit: Vec<String>,
    pub transitions: Vec<Transition>,
}

impl StateNode {
    fn new(id: Option<String>, kind: StateKind) -> Self {
        StateNode {
            id,
            kind,
            initial: None,
            children: Vec::new(),
            on_entry: Vec::new(),
            on_exit: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn simple(id: impl Into<String>) -> Self {
        Self::new(Some(id.into()), StateKind::Simple)
    }

    pub fn r#final(id: impl Into<String>) -> Self {
        Self::new(Some(id.into()), StateKind::Final)
    }

    pub fn composite(
        id: impl Into<String>,
        initial: Option<&str>,
        children: Vec<StateNode>,
    ) -> Self {
        let mut state = Self::new(Some(id.into()), StateKind::Composite);
        state.initial = initial.map(str::to_string);
        state.children = children;
        state
    }

    pub fn parallel(id: impl Into<String>, regions: Vec<StateNode>) -> Self {
        let mut state = Self::new(Some(id.into()), StateKind::Parallel);
        state.children = regions;
        state
    }

    /// A state without declared id.
    pub fn anonymous(kind: StateKind) -> Self {
        Self::new(None, kind)
    }

    pub fn with_children(mut self, children: Vec<StateNode>) -> Self {
        self.children = children;
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn with_on_entry(mut self, action: impl Into<String>) -> Self {
        self.on_entry.push(action.into());
        self
    }

    pub fn with_on_exit(mut self, action: impl Into<String>) -> Self {
        self.on_exit.push(action.into());
        self
    }

    /// Number of states in the subtree rooted here, this one included.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(StateNode::count).sum::<usize>()
    }
}

/// A typed field of the machine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub r#type: String,
    pub id: String,
    /// Initial value.
    /// Fields without one are supplied when the machine is created.
    pub init: Option<String>,
}

/// The root of the semantic model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineModel {
    pub name: String,
    /// Prefix of every generated identifier.
    pub prefix: String,
    /// Fields, in declaration order.
    pub fields: Vec<Field>,
    /// Callback names, in declaration order.
    pub callbacks: Vec<String>,
    /// Opaque code passed through to the generated header.
    pub header: String,
    /// Opaque code passed through to the generated source.
    pub source: String,
    pub root: StateNode,
    /// State entered at start-up, if not the root itself.
    pub initial: Option<String>,
}

impl MachineModel {
    /// Creates a model with the default `mch_<name>` prefix and nothing but the state tree.
    pub fn new(name: impl Into<String>, root: StateNode) -> Self {
        let name = name.into();
        MachineModel {
            prefix: format!("mch_{name}"),
            name,
            fields: Vec::new(),
            callbacks: Vec::new(),
            header: String::new(),
            source: String::new(),
            root,
            initial: None,
        }
    }
}
