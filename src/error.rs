//! Error taxonomy.
//!
//! The teacher crate hand-rolls `impl std::error::Error` and
//! `impl fmt::Display` for its `decode::Error`. We keep the same
//! three-way shape (a version/format problem, a deserialization problem,
//! an opaque "invalid" message) but derive it with `thiserror`, which is
//! the crate the rest of this codebase's lineage reaches for instead of
//! hand-written `Display` impls.
//!
//! Per the configuration-vs-transient split in the specification's error
//! handling design: only configuration-time failures are represented here.
//! Transient physical/protocol failures (decoherence, failed swaps, stale
//! `SWAP_UPDATE`s) are never `Err` values; they are counter increments
//! (see [`crate::metrics::Metrics`]) paired with a `tracing` event.

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("vector length mismatch: expected {expected}, got {actual} for {field}")]
    VectorLengthMismatch { field: &'static str, expected: usize, actual: usize },

    #[error("channel {node_a}-{node_b} is infeasible: length {length_km} km exceeds 2*c*T_coh")]
    InfeasibleChannel { node_a: String, node_b: String, length_km: f64 },

    #[error("unknown swap-sequence preset: {0}")]
    UnknownPreset(String),

    #[error("node {0} has no installed link layer")]
    MissingLinkLayer(String),

    #[error("scheduling error: {0}")]
    Schedule(#[from] crate::scheduler::ScheduleError),

    /// A detected invariant violation. Unlike every other variant, this is
    /// not meant to be recovered from by a caller; the simulator halts the
    /// run and surfaces the diagnostic, matching the "it is a panic (bug
    /// indicator)" rule from the specification.
    #[error("invariant violation at node {node} (path {path_id:?}, cycle {cycle:?}): {detail}")]
    InvariantViolation { node: String, path_id: Option<u32>, cycle: Option<u32>, detail: String },
}

pub type Result<T> = std::result::Result<T, SimError>;
