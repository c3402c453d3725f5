use super::{FlatNode, FlattenError, Leaves, NodeId};
use crate::model::{MachineModel, StateKind, StateNode, Transition};
use hashbrown::{HashMap, HashSet};
use log::trace;
use smallvec::smallvec;

/// Arena view of the state tree, indexed in document (pre-)order.
///
/// Built once per invocation; borrows the transitions of the model it comes from.
#[derive(Debug)]
pub(super) struct Chart<'a> {
    pub(super) nodes: Vec<FlatNode>,
    pub(super) transitions: Vec<&'a [Transition]>,
    // Resolved default child of every composite state
    pub(super) initial: Vec<Option<NodeId>>,
    ids: HashMap<String, NodeId>,
}

impl<'a> Chart<'a> {
    pub(super) fn build(model: &'a MachineModel) -> Result<Self, FlattenError> {
        let mut declared = HashSet::new();
        collect_declared(&model.root, &mut declared)?;

        let capacity = model.root.count();
        let mut chart = Chart {
            nodes: Vec::with_capacity(capacity),
            transitions: Vec::with_capacity(capacity),
            initial: Vec::with_capacity(capacity),
            ids: HashMap::with_capacity(capacity),
        };
        let mut decls = Vec::with_capacity(capacity);
        chart.canonicalize(
            &model.root,
            None,
            model.name.clone(),
            &declared,
            &mut decls,
        );

        for (idx, decl) in decls.into_iter().enumerate() {
            let node = NodeId(idx);
            chart.check_structure(node, decl)?;
            let initial = chart.resolve_initial(node, decl)?;
            chart.initial.push(initial);
        }
        Ok(chart)
    }

    // Depth-first traversal carrying the parent explicitly.
    fn canonicalize(
        &mut self,
        state: &'a StateNode,
        parent: Option<NodeId>,
        synthetic: String,
        declared: &HashSet<&'a str>,
        decls: &mut Vec<&'a StateNode>,
    ) -> NodeId {
        let id = match &state.id {
            Some(id) => id.clone(),
            None => self.fresh_id(synthetic, declared),
        };
        trace!(target: "flatten", "canonical id '{id}'");
        let node = NodeId(self.nodes.len());
        let depth = parent.map_or(0, |parent| self.node(parent).depth + 1);
        self.ids.insert(id.clone(), node);
        self.nodes.push(FlatNode {
            id,
            kind: state.kind,
            parent,
            depth,
            children: Vec::with_capacity(state.children.len()),
            on_entry: state.on_entry.clone(),
            on_exit: state.on_exit.clone(),
        });
        self.transitions.push(&state.transitions);
        decls.push(state);
        for (idx, child) in state.children.iter().enumerate() {
            let synthetic = format!("{}_{idx}", self.node(node).id);
            let child = self.canonicalize(child, Some(node), synthetic, declared, decls);
            self.nodes[node.0].children.push(child);
        }
        node
    }

    // Synthetic ids never shadow a declared id nor an id assigned earlier.
    fn fresh_id(&self, base: String, declared: &HashSet<&'a str>) -> String {
        let mut id = base.clone();
        let mut suffix = 0;
        while declared.contains(id.as_str()) || self.ids.contains_key(&id) {
            suffix += 1;
            id = format!("{base}_{suffix}");
        }
        id
    }

    fn check_structure(&self, node: NodeId, decl: &StateNode) -> Result<(), FlattenError> {
        let invalid = |reason: &'static str| FlattenError::InvalidStructure {
            state: self.node(node).id.clone(),
            reason,
        };
        match decl.kind {
            StateKind::Simple | StateKind::Final => {
                if !decl.children.is_empty() {
                    return Err(invalid("only composite and parallel states have children"));
                }
                if decl.initial.is_some() {
                    return Err(invalid("only composite states declare an initial child"));
                }
                if decl.kind == StateKind::Final && !decl.transitions.is_empty() {
                    return Err(invalid("final states have no transitions"));
                }
            }
            StateKind::Composite => {
                if decl.children.is_empty() {
                    return Err(invalid("composite state without children"));
                }
            }
            StateKind::Parallel => {
                if decl.initial.is_some() {
                    return Err(invalid("only composite states declare an initial child"));
                }
                if decl.children.is_empty() {
                    return Err(invalid("parallel state without regions"));
                }
                if decl
                    .children
                    .iter()
                    .any(|region| matches!(region.kind, StateKind::Parallel | StateKind::Final))
                {
                    return Err(invalid("regions must be simple or composite states"));
                }
            }
        }
        Ok(())
    }

    fn resolve_initial(
        &self,
        node: NodeId,
        decl: &StateNode,
    ) -> Result<Option<NodeId>, FlattenError> {
        match decl.kind {
            StateKind::Composite => {
                let state = &self.node(node).id;
                if let Some(initial) = &decl.initial {
                    let child =
                        self.lookup(initial)
                            .ok_or_else(|| FlattenError::InvalidInitialChild {
                                state: state.clone(),
                                initial: initial.clone(),
                            })?;
                    if child == node || self.is_ancestor(child, node) {
                        Err(FlattenError::InitialCycle {
                            state: state.clone(),
                            initial: initial.clone(),
                        })
                    } else if self.parent(child) != Some(node) {
                        Err(FlattenError::InvalidInitialChild {
                            state: state.clone(),
                            initial: initial.clone(),
                        })
                    } else {
                        Ok(Some(child))
                    }
                } else if let [only] = self.node(node).children.as_slice() {
                    Ok(Some(*only))
                } else {
                    Err(FlattenError::MissingInitialChild(state.clone()))
                }
            }
            StateKind::Simple | StateKind::Parallel | StateKind::Final => Ok(None),
        }
    }

    pub(super) fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub(super) fn node(&self, node: NodeId) -> &FlatNode {
        &self.nodes[node.0]
    }

    pub(super) fn kind(&self, node: NodeId) -> StateKind {
        self.node(node).kind
    }

    pub(super) fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).parent
    }

    pub(super) fn lookup(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    /// Whether `ancestor` is a proper ancestor of `node`.
    pub(super) fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }

    /// Least common ancestor, counting a node as an ancestor of itself.
    pub(super) fn lca(&self, mut a: NodeId, mut b: NodeId) -> NodeId {
        while self.node(a).depth > self.node(b).depth {
            let Some(parent) = self.parent(a) else { break };
            a = parent;
        }
        while self.node(b).depth > self.node(a).depth {
            let Some(parent) = self.parent(b) else { break };
            b = parent;
        }
        while a != b {
            match (self.parent(a), self.parent(b)) {
                (Some(pa), Some(pb)) => {
                    a = pa;
                    b = pb;
                }
                _ => break,
            }
        }
        a
    }

    /// The child of `ancestor` on the way down to `node`.
    pub(super) fn child_towards(&self, ancestor: NodeId, node: NodeId) -> Option<NodeId> {
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            if parent == ancestor {
                return Some(current);
            }
            current = parent;
        }
        None
    }

    /// Nodes from just below `top` (exclusive) down to `node` (inclusive), outermost first.
    /// With no `top`, the path starts at the root.
    pub(super) fn path_below(&self, top: Option<NodeId>, node: NodeId) -> Vec<NodeId> {
        let mut path = Vec::with_capacity(self.node(node).depth + 1);
        let mut current = Some(node);
        while let Some(n) = current {
            if Some(n) == top {
                break;
            }
            path.push(n);
            current = self.parent(n);
        }
        path.reverse();
        path
    }

    /// Every configuration of active leaves the subtree of `node` can be in, in document order.
    ///
    /// Fails as soon as there are more than `limit` of them.
    pub(super) fn configurations(
        &self,
        node: NodeId,
        limit: usize,
    ) -> Result<Vec<Leaves>, FlattenError> {
        let too_many = || FlattenError::TooManyStates {
            state: self.node(node).id.clone(),
            limit,
        };
        match self.kind(node) {
            StateKind::Simple | StateKind::Final => Ok(vec![smallvec![node]]),
            StateKind::Composite => {
                let mut configs = Vec::new();
                for &child in &self.node(node).children {
                    configs.extend(self.configurations(child, limit)?);
                    if configs.len() > limit {
                        return Err(too_many());
                    }
                }
                Ok(configs)
            }
            StateKind::Parallel => {
                let mut product: Vec<Leaves> = vec![Leaves::new()];
                for &region in &self.node(node).children {
                    let region_configs = self.configurations(region, limit)?;
                    if product.len().saturating_mul(region_configs.len()) > limit {
                        return Err(too_many());
                    }
                    product = product
                        .iter()
                        .flat_map(|prefix| {
                            region_configs.iter().map(move |config| {
                                let mut leaves = prefix.clone();
                                leaves.extend_from_slice(config);
                                leaves
                            })
                        })
                        .collect();
                }
                Ok(product)
            }
        }
    }
}

fn collect_declared<'a>(
    state: &'a StateNode,
    declared: &mut HashSet<&'a str>,
) -> Result<(), FlattenError> {
    if let Some(id) = &state.id {
        if !declared.insert(id.as_str()) {
            return Err(FlattenError::DuplicateStateId(id.clone()));
        }
    }
    state
        .children
        .iter()
        .try_for_each(|child| collect_declared(child, declared))
}
