//! Reference host graph.
//!
//! `CircuitSceneGraph` is a small in-memory circuit that implements
//! `CircuitHost`, wires the three interception points the way a real engine
//! would, and counts authoritative recomputations. Tests and benches drive the
//! optimizer through it.

pub mod scene;

pub use scene::{CircuitSceneGraph, Component, ComponentKind};
