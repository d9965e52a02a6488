//! In-memory circuit scene graph.
//!
//! Components live in a generation-tagged arena, are addressed by position,
//! and are indexed per chunk for ordered traversal. Evaluation rules:
//!
//! - input power = max over live inputs of `source.strength - dampening`,
//!   floored at 0 (free or reused source slots contribute nothing);
//! - wires, lamps and comparators output the input power;
//! - torches invert it;
//! - repeaters switch to 15/0 after `delay` consecutive evaluations that see
//!   the new input;
//! - pulse capacitors emit 15 on a rising input edge and 0 otherwise.
//!
//! # Cascading
//! With cascading on, a component whose output changed re-evaluates its
//! dependents immediately, through the optimizer when one is attached. This
//! re-enters the interception layer recursively. Oscillating loops (a torch
//! feeding itself) never settle and must not be cascaded.

use crate::arena::{NodeArena, NodeKey, Resolved};
use crate::core::{BlockPos, CircuitComponent, CircuitHost, InputEdge};
use crate::optimizer::{CircuitOptimizer, Evaluation, Outcome};
use crate::ordered_index::{OrderedChunkIndex, SortStrategy};
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum output strength.
pub const MAX_STRENGTH: i32 = 15;

/// Component categories of the reference host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// Constant output, set from outside.
    PowerSource,
    Wire,
    Lamp,
    Repeater { delay: u8 },
    Torch,
    Comparator,
    PulseCapacitor,
}

impl ComponentKind {
    /// Stable category tag.
    pub fn tag(&self) -> u32 {
        match self {
            ComponentKind::PowerSource => 0,
            ComponentKind::Wire => 1,
            ComponentKind::Lamp => 2,
            ComponentKind::Repeater { .. } => 3,
            ComponentKind::Torch => 4,
            ComponentKind::Comparator => 5,
            ComponentKind::PulseCapacitor => 6,
        }
    }

    /// Categories whose output depends on more than the current inputs.
    /// Power sources count: their output is set from outside.
    pub fn has_internal_timer(&self) -> bool {
        matches!(
            self,
            ComponentKind::PowerSource
                | ComponentKind::Repeater { .. }
                | ComponentKind::Torch
                | ComponentKind::Comparator
                | ComponentKind::PulseCapacitor
        )
    }
}

/// A component and its evaluation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    kind: ComponentKind,
    pos: BlockPos,
    strength: i32,
    inputs: Vec<InputEdge>,
    timer: u32,
    last_input: i32,
}

impl Component {
    fn new(kind: ComponentKind, pos: BlockPos, inputs: Vec<InputEdge>) -> Self {
        Self {
            kind,
            pos,
            strength: 0,
            inputs,
            timer: 0,
            last_input: 0,
        }
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn pos(&self) -> BlockPos {
        self.pos
    }

    /// Applies one evaluation with the given input power. Returns whether the
    /// output changed.
    fn step(&mut self, power: i32) -> bool {
        let next = match self.kind {
            ComponentKind::PowerSource => return false,
            ComponentKind::Wire | ComponentKind::Lamp | ComponentKind::Comparator => power,
            ComponentKind::Torch => {
                if power > 0 {
                    0
                } else {
                    MAX_STRENGTH
                }
            }
            ComponentKind::Repeater { delay } => {
                let target = if power > 0 { MAX_STRENGTH } else { 0 };
                if target == self.strength {
                    self.timer = 0;
                    return false;
                }
                self.timer += 1;
                if self.timer < u32::from(delay.max(1)) {
                    return false;
                }
                self.timer = 0;
                target
            }
            ComponentKind::PulseCapacitor => {
                let rising = power > 0 && self.last_input == 0;
                self.last_input = power;
                if rising {
                    MAX_STRENGTH
                } else {
                    0
                }
            }
        };
        let changed = next != self.strength;
        self.strength = next;
        changed
    }
}

impl CircuitComponent for Component {
    fn strength(&self) -> i32 {
        self.strength
    }

    fn set_strength(&mut self, strength: i32) {
        self.strength = strength;
    }

    fn inputs(&self) -> &[InputEdge] {
        &self.inputs
    }

    fn has_internal_timer(&self) -> bool {
        self.kind.has_internal_timer()
    }

    fn kind_tag(&self) -> u32 {
        self.kind.tag()
    }
}

/// Reference host: arena-backed components, position lookup and chunk index.
#[derive(Debug, Default)]
pub struct CircuitSceneGraph {
    arena: NodeArena<Component>,
    positions: HashMap<BlockPos, NodeKey>,
    index: OrderedChunkIndex,
    optimizer: Option<Arc<CircuitOptimizer>>,
    tick: u64,
    recomputations: u64,
    cascade: bool,
}

impl CircuitSceneGraph {
    /// Creates a graph that evaluates everything uncached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a graph whose interception points go through `optimizer`.
    pub fn with_optimizer(optimizer: Arc<CircuitOptimizer>) -> Self {
        Self {
            optimizer: Some(optimizer),
            ..Self::default()
        }
    }

    pub fn optimizer(&self) -> Option<&Arc<CircuitOptimizer>> {
        self.optimizer.as_ref()
    }

    /// Enables immediate re-evaluation of dependents on change.
    pub fn set_cascade(&mut self, cascade: bool) {
        self.cascade = cascade;
    }

    /// Adds a component at `pos`, replacing whatever was there.
    pub fn add(&mut self, pos: BlockPos, kind: ComponentKind, inputs: Vec<InputEdge>) -> NodeKey {
        if self.positions.contains_key(&pos) {
            self.remove(pos);
        }
        let key = self.arena.allocate(Component::new(kind, pos, inputs));
        self.positions.insert(pos, key);
        match &self.optimizer {
            Some(optimizer) => optimizer.on_node_inserted(&mut self.index, pos, key),
            None => self.index.insert(pos, key, SortStrategy::default()),
        }
        key
    }

    /// Removes the component at `pos`, notifying the optimizer before its
    /// slot is freed.
    pub fn remove(&mut self, pos: BlockPos) -> Option<Component> {
        let key = *self.positions.get(&pos)?;
        if let Some(optimizer) = &self.optimizer {
            optimizer.on_node_removed(key);
        }
        self.remove_silently(pos)
    }

    /// Removes the component at `pos` without telling the optimizer, as a
    /// host that lost a removal notification would.
    pub fn remove_silently(&mut self, pos: BlockPos) -> Option<Component> {
        let key = self.positions.remove(&pos)?;
        self.index.remove(pos);
        self.arena.deallocate(key)
    }

    pub fn key_at(&self, pos: BlockPos) -> Option<NodeKey> {
        self.positions.get(&pos).copied()
    }

    pub fn component(&self, key: NodeKey) -> Option<&Component> {
        self.arena.get(key)
    }

    pub fn strength(&self, key: NodeKey) -> Option<i32> {
        self.arena.get(key).map(|component| component.strength)
    }

    /// Sets the output of a power source.
    pub fn set_power(&mut self, key: NodeKey, strength: i32) {
        if let Some(component) = self.arena.get_mut(key) {
            debug_assert_eq!(component.kind, ComponentKind::PowerSource);
            component.strength = strength;
        }
    }

    /// Overwrites any component's output, bypassing evaluation.
    pub fn force_strength(&mut self, key: NodeKey, strength: i32) {
        if let Some(component) = self.arena.get_mut(key) {
            component.strength = strength;
        }
    }

    /// Replaces a component's inputs.
    pub fn set_inputs(&mut self, key: NodeKey, inputs: Vec<InputEdge>) {
        if let Some(component) = self.arena.get_mut(key) {
            component.inputs = inputs;
        }
    }

    /// Evaluates one component through the node-evaluated hook.
    pub fn evaluate(&mut self, key: NodeKey) -> Evaluation {
        let Some(pos) = self.arena.get(key).map(Component::pos) else {
            return Evaluation {
                changed: false,
                outcome: Outcome::Fallback,
            };
        };
        match self.optimizer.clone() {
            Some(optimizer) => optimizer.evaluate(self, key, pos),
            None => Evaluation {
                changed: self.evaluate_uncached(key, pos),
                outcome: Outcome::Skip,
            },
        }
    }

    /// Advances one tick: evaluates every component in traversal order.
    /// Returns how many changed.
    pub fn step(&mut self) -> usize {
        self.tick += 1;
        let order = self.index.traversal();
        let changed = order
            .into_iter()
            .filter(|(_, key)| self.evaluate(*key).changed)
            .count();
        for chunk in self.index.chunks() {
            if let Some(list) = self.index.chunk_mut(chunk) {
                list.should_evaluate = false;
            }
        }
        changed
    }

    /// Number of authoritative (uncached) evaluations so far.
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }

    pub fn index(&self) -> &OrderedChunkIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.arena.live_count()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.live_count() == 0
    }

    fn input_power(&self, component: &Component) -> i32 {
        component
            .inputs
            .iter()
            .filter_map(|edge| {
                self.arena
                    .get(edge.source)
                    .map(|source| (source.strength - edge.dampening).max(0))
            })
            .max()
            .unwrap_or(0)
    }

    fn dependents(&self, key: NodeKey) -> Vec<NodeKey> {
        self.arena
            .iter()
            .filter(|(_, component)| component.inputs.iter().any(|edge| edge.source == key))
            .map(|(dependent, _)| dependent)
            .collect()
    }
}

impl CircuitHost for CircuitSceneGraph {
    type Component = Component;

    fn resolve(&self, key: NodeKey) -> Resolved<'_, Component> {
        self.arena.resolve(key)
    }

    fn component_mut(&mut self, key: NodeKey) -> Option<&mut Component> {
        self.arena.get_mut(key)
    }

    fn evaluate_uncached(&mut self, key: NodeKey, _pos: BlockPos) -> bool {
        self.recomputations += 1;
        let Some(power) = self.arena.get(key).map(|component| self.input_power(component)) else {
            return false;
        };
        let changed = self
            .arena
            .get_mut(key)
            .is_some_and(|component| component.step(power));
        if changed && self.cascade {
            for dependent in self.dependents(key) {
                self.evaluate(dependent);
            }
        }
        changed
    }

    fn current_tick(&self) -> u64 {
        self.tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn uncached_rules() {
        let mut graph = CircuitSceneGraph::new();
        let source = graph.add(BlockPos::new(0, 0, 0), ComponentKind::PowerSource, vec![]);
        graph.set_power(source, 10);
        let wire = graph.add(
            BlockPos::new(1, 0, 0),
            ComponentKind::Wire,
            vec![InputEdge::from_source(source).with_dampening(3)],
        );
        let torch = graph.add(
            BlockPos::new(2, 0, 0),
            ComponentKind::Torch,
            vec![InputEdge::from_source(wire)],
        );

        assert!(graph.evaluate(wire).changed);
        assert_eq!(graph.strength(wire), Some(7));
        assert!(!graph.evaluate(torch).changed);
        assert_eq!(graph.strength(torch), Some(0));

        graph.set_power(source, 0);
        graph.evaluate(wire);
        assert!(graph.evaluate(torch).changed);
        assert_eq!(graph.strength(torch), Some(15));
        assert_eq!(graph.recomputations(), 4);
    }

    #[test]
    fn add_replaces_and_remove_frees() {
        let mut graph = CircuitSceneGraph::new();
        let pos = BlockPos::new(3, 0, 3);
        let first = graph.add(pos, ComponentKind::Wire, vec![]);
        let second = graph.add(pos, ComponentKind::Lamp, vec![]);
        assert_eq!(graph.len(), 1);
        assert_eq!(second.slot(), first.slot());
        assert!(graph.component(first).is_none());
        assert_eq!(graph.key_at(pos), Some(second));
        assert_eq!(graph.index().len(), 1);

        assert_eq!(graph.remove(pos).map(|c| c.kind()), Some(ComponentKind::Lamp));
        assert!(graph.is_empty());
        assert!(graph.index().is_empty());
        assert!(graph.remove(pos).is_none());
    }

    #[test]
    fn step_follows_traversal_order() {
        let mut graph = CircuitSceneGraph::new();
        let source = graph.add(BlockPos::new(0, 0, 0), ComponentKind::PowerSource, vec![]);
        graph.set_power(source, 15);
        // Added downstream-first; traversal order (by x) still evaluates the
        // nearer wire first, so one step settles the chain.
        let far = graph.add(BlockPos::new(2, 0, 0), ComponentKind::Wire, vec![]);
        let near = graph.add(
            BlockPos::new(1, 0, 0),
            ComponentKind::Wire,
            vec![InputEdge::from_source(source).with_dampening(1)],
        );
        graph.set_inputs(far, vec![InputEdge::from_source(near).with_dampening(1)]);

        assert_eq!(graph.step(), 2);
        assert_eq!(graph.strength(far), Some(13));
        assert_eq!(graph.step(), 0);
        assert_eq!(graph.current_tick(), 2);
        assert!(!graph.index().chunk(BlockPos::new(0, 0, 0)).unwrap().should_evaluate);
    }

    #[test]
    fn cached_steps_match_uncached_steps() {
        fn build(graph: &mut CircuitSceneGraph) -> NodeKey {
            let source = graph.add(BlockPos::new(0, 0, 0), ComponentKind::PowerSource, vec![]);
            let mut prev = source;
            for x in 1..20 {
                let kind = match x % 5 {
                    0 => ComponentKind::Repeater { delay: 2 },
                    3 => ComponentKind::Lamp,
                    _ => ComponentKind::Wire,
                };
                prev = graph.add(
                    BlockPos::new(x, 0, x % 3),
                    kind,
                    vec![InputEdge::from_source(prev).with_dampening(1)],
                );
            }
            source
        }

        let optimizer = Arc::new(CircuitOptimizer::new(Config::default()));
        let mut cached = CircuitSceneGraph::with_optimizer(Arc::clone(&optimizer));
        let mut plain = CircuitSceneGraph::new();
        let cached_source = build(&mut cached);
        let plain_source = build(&mut plain);

        for step in 0..30 {
            let power = if (step / 7) % 2 == 0 { 15 } else { 0 };
            cached.set_power(cached_source, power);
            plain.set_power(plain_source, power);
            cached.step();
            plain.step();
            let a: Vec<_> = cached.index().traversal().iter().map(|(_, k)| cached.strength(*k)).collect();
            let b: Vec<_> = plain.index().traversal().iter().map(|(_, k)| plain.strength(*k)).collect();
            assert_eq!(a, b, "diverged at step {step}");
        }
        assert!(cached.recomputations() < plain.recomputations());
        assert!(optimizer.stats().hits > 0);
    }
}
