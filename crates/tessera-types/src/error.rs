//! Error types for the `tessera-types` crate.

/// Errors raised while constructing or parsing shared value types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    /// A phase name did not match any known [`PhaseType`](crate::PhaseType).
    #[error("unknown phase type: {0}")]
    UnknownPhaseType(String),

    /// A node station was built without any phase predictions.
    #[error("node station {0} has no phase info")]
    EmptyPhaseInfos(crate::StationId),

    /// A grid node was built without any node stations.
    #[error("grid node {0} has no node stations")]
    EmptyNodeStations(crate::GridNodeId),

    /// A node station lists the same phase twice.
    #[error("node station {station} has more than one {phase} phase info")]
    DuplicatePhase {
        /// The station.
        station: crate::StationId,
        /// The repeated phase.
        phase: crate::PhaseType,
    },

    /// A grid node lists the same station twice.
    #[error("grid node {node} has more than one node station for {station}")]
    DuplicateStation {
        /// The grid node.
        node: crate::GridNodeId,
        /// The repeated station.
        station: crate::StationId,
    },
}
