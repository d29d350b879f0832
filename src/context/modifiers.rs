/// How person fields accessed from events are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonJoinMode {
    /// Materialize a lazy join against the person table.
    Joined,
    /// Read the denormalized person-properties column on the events table.
    Denormalized,
}

/// Per-query feature toggles threaded through the pipeline. Each one gates
/// an optimizer pass or a join-resolution strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Modifiers {
    pub person_join_mode: PersonJoinMode,
    pub use_preaggregated_tables: bool,
    pub property_columns: bool,
    pub timestamp_hints: bool,
    pub pushdown: bool,
}

impl Default for Modifiers {
    fn default() -> Self {
        Self {
            person_join_mode: PersonJoinMode::Joined,
            use_preaggregated_tables: true,
            property_columns: true,
            timestamp_hints: true,
            pushdown: true,
        }
    }
}
