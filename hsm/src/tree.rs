//! The registered state graph: parent links plus precomputed ancestor
//! chains, built once at `start` instead of walked on every lookup.
use std::collections::HashMap;

use crate::errors::{HsmError, HsmResult};
use crate::state::{State, StateEntry, StateId};

pub(crate) struct Tree {
    entries: HashMap<StateId, StateEntry>,
    insertion_order: Vec<StateId>,
    initial: Option<StateId>,
    started: bool,
}

impl Tree {
    pub(crate) fn new() -> Self {
        Tree {
            entries: HashMap::new(),
            insertion_order: Vec::new(),
            initial: None,
            started: false,
        }
    }

    pub(crate) fn add_state(
        &mut self,
        id: StateId,
        parent: Option<StateId>,
        state: Box<dyn State>,
    ) -> HsmResult<()> {
        if self.started {
            return Err(HsmError::ConfigurationAfterStart);
        }
        if self.entries.contains_key(&id) {
            return Err(HsmError::DuplicateState(id));
        }
        if let Some(parent_id) = parent {
            if !self.entries.contains_key(&parent_id) {
                return Err(HsmError::UnknownParent(parent_id));
            }
            if self.creates_cycle(id, parent_id) {
                return Err(HsmError::CycleDetected(id, parent_id));
            }
        }
        self.entries.insert(
            id,
            StateEntry {
                state,
                parent,
                ancestors: Vec::new(),
            },
        );
        self.insertion_order.push(id);
        Ok(())
    }

    /// Would registering `new_child`'s parent as `proposed_parent` close a
    /// cycle? True if `proposed_parent`'s existing ancestor chain already
    /// contains `new_child`.
    fn creates_cycle(&self, new_child: StateId, proposed_parent: StateId) -> bool {
        let mut current = Some(proposed_parent);
        while let Some(id) = current {
            if id == new_child {
                return true;
            }
            current = self.entries.get(&id).and_then(|e| e.parent);
        }
        false
    }

    pub(crate) fn set_initial_state(&mut self, id: StateId) -> HsmResult<()> {
        if self.started {
            return Err(HsmError::ConfigurationAfterStart);
        }
        if !self.entries.contains_key(&id) {
            return Err(HsmError::UnknownState(id));
        }
        self.initial = Some(id);
        Ok(())
    }

    pub(crate) fn initial_state(&self) -> HsmResult<StateId> {
        self.initial.ok_or(HsmError::NoInitialState)
    }

    /// Precompute every state's ancestor chain. Called exactly once, from
    /// `Machine::start`.
    pub(crate) fn finalize(&mut self) -> HsmResult<()> {
        if self.initial.is_none() {
            return Err(HsmError::NoInitialState);
        }
        let ids: Vec<StateId> = self.insertion_order.clone();
        for id in ids {
            let mut chain = vec![id];
            let mut current = self.entries.get(&id).and_then(|e| e.parent);
            while let Some(p) = current {
                chain.push(p);
                current = self.entries.get(&p).and_then(|e| e.parent);
            }
            self.entries.get_mut(&id).unwrap().ancestors = chain;
        }
        self.started = true;
        Ok(())
    }

    pub(crate) fn contains(&self, id: StateId) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn state(&self, id: StateId) -> Option<&dyn State> {
        self.entries.get(&id).map(|e| e.state.as_ref())
    }

    pub(crate) fn parent(&self, id: StateId) -> Option<StateId> {
        self.entries.get(&id).and_then(|e| e.parent)
    }

    /// `[self, parent, grandparent, ..., root]`.
    pub(crate) fn ancestors(&self, id: StateId) -> &[StateId] {
        self.entries
            .get(&id)
            .map(|e| e.ancestors.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn name(&self, id: StateId) -> Option<String> {
        self.entries
            .get(&id)
            .and_then(|e| e.state.name())
            .map(|s| s.to_string())
    }

    /// Deepest state present in both `a` and `b`'s ancestor chains.
    pub(crate) fn least_common_ancestor(&self, a: StateId, b: StateId) -> HsmResult<StateId> {
        if !self.entries.contains_key(&a) {
            return Err(HsmError::UnknownState(a));
        }
        if !self.entries.contains_key(&b) {
            return Err(HsmError::UnknownState(b));
        }
        let chain_b = self.ancestors(b);
        for candidate in self.ancestors(a) {
            if chain_b.contains(candidate) {
                return Ok(*candidate);
            }
        }
        unreachable!("every chain shares the root it was built from")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl State for Noop {}

    fn id(n: u32) -> StateId {
        StateId::new(n)
    }

    #[test]
    fn rejects_duplicate_id() {
        let mut tree = Tree::new();
        tree.add_state(id(1), None, Box::new(Noop)).unwrap();
        tree.add_state(id(2), Some(id(1)), Box::new(Noop)).unwrap();
        let err = tree.add_state(id(1), Some(id(2)), Box::new(Noop));
        assert!(matches!(err, Err(HsmError::DuplicateState(_))));
    }

    #[test]
    fn rejects_unknown_parent() {
        let mut tree = Tree::new();
        tree.add_state(id(1), None, Box::new(Noop)).unwrap();
        let err = tree.add_state(id(2), Some(id(99)), Box::new(Noop));
        assert!(matches!(err, Err(HsmError::UnknownParent(_))));
    }

    #[test]
    fn fresh_state_can_be_parented_anywhere_in_the_existing_tree() {
        // A brand-new id can never already be an ancestor of its chosen
        // parent, so `creates_cycle` never fires through `add_state` alone;
        // this is the invariant that guarantees that, not a gap in coverage.
        let mut tree = Tree::new();
        tree.add_state(id(1), None, Box::new(Noop)).unwrap();
        tree.add_state(id(2), Some(id(1)), Box::new(Noop)).unwrap();
        tree.add_state(id(3), Some(id(2)), Box::new(Noop)).unwrap();
        assert!(tree.add_state(id(4), Some(id(3)), Box::new(Noop)).is_ok());
    }

    #[test]
    fn lca_finds_deepest_shared_ancestor() {
        let mut tree = Tree::new();
        tree.add_state(id(1), None, Box::new(Noop)).unwrap(); // top
        tree.add_state(id(2), Some(id(1)), Box::new(Noop)).unwrap(); // a
        tree.add_state(id(3), Some(id(1)), Box::new(Noop)).unwrap(); // b
        tree.add_state(id(4), Some(id(2)), Box::new(Noop)).unwrap(); // a.child
        tree.set_initial_state(id(4)).unwrap();
        tree.finalize().unwrap();

        assert_eq!(tree.least_common_ancestor(id(4), id(3)).unwrap(), id(1));
        assert_eq!(tree.least_common_ancestor(id(4), id(2)).unwrap(), id(2));
        assert_eq!(tree.least_common_ancestor(id(2), id(3)).unwrap(), id(1));
    }
}
