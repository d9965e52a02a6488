//! Input fingerprinting for circuit components.
//!
//! A fingerprint is a cheap, order-sensitive 64-bit summary of everything a
//! cacheable component reads when it recomputes: the live strength of each
//! source and the modifiers of the edge it arrives on. Equal inputs in equal
//! order give equal fingerprints; any single-field change changes the
//! fingerprint (the fold is `h * P + field` with odd `P`, so a non-zero delta
//! in one field can never cancel modulo 2^64).
//!
//! Not cryptographic. Collisions across unrelated input sets are accepted at
//! 64-bit granularity.

use crate::arena::{NodeKey, Resolved};
use crate::core::{CircuitComponent, CircuitHost};
use crate::error::FingerprintError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Odd multiplier of the polynomial fold.
pub const FINGERPRINT_MULTIPLIER: u64 = 31;

/// 64-bit summary of a component's inputs.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputFingerprint(u64);

impl InputFingerprint {
    /// Fingerprint of a component with no live inputs.
    pub const EMPTY: InputFingerprint = InputFingerprint(0);

    /// Wraps a raw value.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    #[inline]
    fn fold(self, field: i64) -> Self {
        Self(
            self.0
                .wrapping_mul(FINGERPRINT_MULTIPLIER)
                .wrapping_add(field as u64),
        )
    }
}

impl fmt::Display for InputFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InputFingerprint({:016x})", self.0)
    }
}

/// Which properties of a source contribute to the fingerprint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintMode {
    /// Source strength plus edge modifiers.
    #[default]
    Inputs,
    /// Additionally folds each source's category tag, so replacing a source
    /// with a different kind of component invalidates even at equal strength.
    TypeSensitive,
}

/// Computes the fingerprint of `component`'s inputs.
///
/// Sources whose slot is free are dangling edges and are skipped. A source
/// whose slot was reused by another generation cannot be trusted; the whole
/// computation fails so the caller falls back to an uncached recomputation.
pub fn fingerprint<H: CircuitHost>(
    host: &H,
    component: &H::Component,
    mode: FingerprintMode,
) -> Result<InputFingerprint, FingerprintError> {
    let mut hash = InputFingerprint::EMPTY;
    for edge in component.inputs() {
        let source = match host.resolve(edge.source) {
            Resolved::Live(source) => source,
            Resolved::Vacant => continue,
            Resolved::Stale => {
                return Err(FingerprintError::StaleSource {
                    slot: edge.source.slot(),
                    generation: edge.source.generation(),
                })
            }
        };
        if mode == FingerprintMode::TypeSensitive {
            hash = hash.fold(i64::from(source.kind_tag()));
        }
        hash = hash
            .fold(i64::from(source.strength()))
            .fold(i64::from(edge.dampening))
            .fold(i64::from(edge.directly_powered))
            .fold(i64::from(edge.direction))
            .fold(i64::from(edge.data));
    }
    Ok(hash)
}

/// Resolves `key` and fingerprints the component it names.
pub fn fingerprint_of<H: CircuitHost>(
    host: &H,
    key: NodeKey,
    mode: FingerprintMode,
) -> Result<InputFingerprint, FingerprintError> {
    match host.resolve(key) {
        Resolved::Live(component) => fingerprint(host, component, mode),
        Resolved::Vacant | Resolved::Stale => Err(FingerprintError::StaleComponent(key)),
    }
}
