use super::chart::Chart;
use super::{Fired, FlattenError, Leaves, NodeId, StateId, Step};
use crate::model::{GUARD_TRUE, StateKind, Transition, TransitionKind};
use hashbrown::HashMap;

/// The part of the tree a transition exits and re-enters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Domain {
    /// The whole tree, root included.
    Root,
    /// Every proper descendant of the node.
    Below(NodeId),
    /// A region of a parallel state, the region itself included.
    Region(NodeId),
}

impl Domain {
    fn top(self) -> Option<NodeId> {
        match self {
            Domain::Root => None,
            Domain::Below(node) | Domain::Region(node) => Some(node),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Selected<'a> {
    source: NodeId,
    transition: &'a Transition,
}

impl<'a> Chart<'a> {
    /// Computes the part of the tree left and re-entered by a transition from `source` to `target`.
    ///
    /// Fails if the transition crosses from one region of a parallel state to another.
    pub(super) fn domain(
        &self,
        source: NodeId,
        target: NodeId,
        kind: TransitionKind,
    ) -> Result<Domain, FlattenError> {
        if kind == TransitionKind::Internal && self.is_ancestor(source, target) {
            return Ok(Domain::Below(source));
        }
        let lca = self.lca(source, target);
        let domain = if lca == source || lca == target {
            self.parent(lca)
        } else {
            Some(lca)
        };
        match domain {
            None => Ok(Domain::Root),
            Some(domain) if self.kind(domain) == StateKind::Parallel && domain != source => {
                let source_region = self.child_towards(domain, source);
                let target_region = self.child_towards(domain, target);
                match (source_region, target_region) {
                    (Some(region), Some(other)) if region == other => Ok(Domain::Region(region)),
                    _ => Err(FlattenError::CrossRegionTransition {
                        state: self.node(source).id.clone(),
                        target: self.node(target).id.clone(),
                        parallel: self.node(domain).id.clone(),
                    }),
                }
            }
            Some(domain) => Ok(Domain::Below(domain)),
        }
    }

    fn in_domain(&self, domain: Domain, node: NodeId) -> bool {
        match domain {
            Domain::Root => true,
            Domain::Below(top) => self.is_ancestor(top, node),
            Domain::Region(region) => region == node || self.is_ancestor(region, node),
        }
    }

    fn overlaps(&self, a: Domain, b: Domain) -> bool {
        match (a.top(), b.top()) {
            (Some(a), Some(b)) => a == b || self.is_ancestor(a, b) || self.is_ancestor(b, a),
            _ => true,
        }
    }

    /// Active states inside `domain`, innermost first.
    pub(super) fn exit_set(&self, leaves: &[NodeId], domain: Domain) -> Vec<NodeId> {
        let mut exited = Vec::new();
        for &leaf in leaves.iter().filter(|&&leaf| self.in_domain(domain, leaf)) {
            let mut current = Some(leaf);
            while let Some(node) = current {
                if !self.in_domain(domain, node) {
                    break;
                }
                if !exited.contains(&node) {
                    exited.push(node);
                }
                current = self.parent(node);
            }
        }
        exited.sort_by(|a, b| {
            self.node(*b)
                .depth
                .cmp(&self.node(*a).depth)
                .then(b.cmp(a))
        });
        exited
    }

    /// States entered to reach `target` inside `domain`, outermost first,
    /// completed with the default entry of composite and parallel states.
    pub(super) fn entry_set(&self, domain: Domain, target: NodeId) -> Vec<NodeId> {
        let mut entered = Vec::new();
        match domain {
            Domain::Below(top) if self.kind(top) == StateKind::Parallel => {
                let path = self.path_below(Some(top), target);
                for &region in &self.node(top).children {
                    match path.split_first() {
                        Some((&first, rest)) if first == region => {
                            self.enter(region, rest, &mut entered)
                        }
                        _ => self.enter(region, &[], &mut entered),
                    }
                }
            }
            Domain::Region(region) => {
                let path = self.path_below(Some(region), target);
                self.enter(region, &path, &mut entered);
            }
            Domain::Root | Domain::Below(_) => {
                let path = self.path_below(domain.top(), target);
                if let Some((&first, rest)) = path.split_first() {
                    self.enter(first, rest, &mut entered);
                }
            }
        }
        entered
    }

    // Enters `node`, then follows `path` below it while there is one,
    // and default children afterwards.
    fn enter(&self, node: NodeId, path: &[NodeId], entered: &mut Vec<NodeId>) {
        entered.push(node);
        match self.kind(node) {
            StateKind::Simple | StateKind::Final => {}
            StateKind::Composite => match path.split_first() {
                Some((&child, rest)) => self.enter(child, rest, entered),
                None => {
                    if let Some(child) = self.initial[node.0] {
                        self.enter(child, &[], entered);
                    }
                }
            },
            StateKind::Parallel => {
                for &region in &self.node(node).children {
                    match path.split_first() {
                        Some((&child, rest)) if child == region => {
                            self.enter(region, rest, entered)
                        }
                        _ => self.enter(region, &[], entered),
                    }
                }
            }
        }
    }

    /// Picks, for every active leaf, the closest transition matching `event`.
    fn select(&self, leaves: &[NodeId], event: Option<&str>) -> Vec<Selected<'a>> {
        let mut selected: Vec<Selected<'a>> = Vec::new();
        for &leaf in leaves {
            let mut current = Some(leaf);
            while let Some(node) = current {
                let transitions: &'a [Transition] = self.transitions[node.0];
                if let Some(transition) = transitions
                    .iter()
                    .find(|transition| transition.event.as_deref() == event)
                {
                    if !selected.iter().any(|s| s.source == node) {
                        selected.push(Selected {
                            source: node,
                            transition,
                        });
                    }
                    break;
                }
                current = self.parent(node);
            }
        }
        selected
    }

    /// Computes what happens when `event` occurs in the configuration `leaves`.
    ///
    /// Returns `None` when no transition applies.
    pub(super) fn step(
        &self,
        leaves: &Leaves,
        event: Option<&str>,
        index: &HashMap<Leaves, StateId>,
    ) -> Result<Option<Step>, FlattenError> {
        let selected = self.select(leaves, event);
        if selected.is_empty() {
            return Ok(None);
        }
        let describe = || {
            let state = leaves
                .iter()
                .map(|leaf| self.node(*leaf).id.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            (state, event.unwrap_or_default().to_string())
        };
        if selected.len() > 1
            && selected
                .iter()
                .any(|selected| !selected.transition.is_unguarded())
        {
            let (state, event) = describe();
            return Err(FlattenError::AmbiguousGuards { state, event });
        }

        let guard = match selected.as_slice() {
            [single] => single.transition.guard.clone(),
            _ => GUARD_TRUE.to_string(),
        };
        let mut fired = Vec::with_capacity(selected.len());
        let mut domains: Vec<(Domain, NodeId)> = Vec::with_capacity(selected.len());
        let mut resolved = true;
        for Selected { source, transition } in selected {
            fired.push(Fired {
                source,
                target: transition.target.clone(),
                kind: transition.kind,
            });
            if let Some(target) = &transition.target {
                if let Some(target) = self.lookup(target) {
                    let domain = self.domain(source, target, transition.kind)?;
                    if domains
                        .iter()
                        .any(|(other, _)| self.overlaps(*other, domain))
                    {
                        let (state, event) = describe();
                        return Err(FlattenError::ConflictingTransitions { state, event });
                    }
                    domains.push((domain, target));
                } else {
                    resolved = false;
                }
            }
        }
        if !resolved {
            return Ok(Some(Step {
                fired,
                guard,
                next: None,
                exit: Vec::new(),
                entry: Vec::new(),
            }));
        }

        let mut exit = Vec::new();
        let mut entry = Vec::new();
        for &(domain, target) in &domains {
            exit.extend(self.exit_set(leaves, domain));
            entry.extend(self.entry_set(domain, target));
        }
        let mut next: Leaves = leaves
            .iter()
            .copied()
            .filter(|leaf| !exit.contains(leaf))
            .collect();
        next.extend(entry.iter().copied().filter(|node| {
            matches!(self.kind(*node), StateKind::Simple | StateKind::Final)
        }));
        next.sort();
        next.dedup();
        Ok(Some(Step {
            fired,
            guard,
            next: index.get(&next).copied(),
            exit,
            entry,
        }))
    }
}
