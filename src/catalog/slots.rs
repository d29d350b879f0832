use indexmap::IndexMap;

/// Backfill state of one materialized property column. Only `Ready` slots
/// are substituted; the others silently fall back to JSON extraction while
/// the background backfill catches up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    Ready,
    Backfilling,
    Disabled,
}

/// A typed storage slot for one JSON property of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySlot {
    pub column: String,
    pub state: ReadinessState,
}

/// Per-tenant map of materialized property columns, keyed by
/// (table name, property name). External state input: readiness is decided
/// by the backfill process, not by this crate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertySlots {
    slots: IndexMap<(String, String), PropertySlot>,
}

impl PropertySlots {
    pub fn insert(&mut self, table: &str, property: &str, slot: PropertySlot) {
        self.slots.insert((table.to_string(), property.to_string()), slot);
    }

    /// The slot for a property, only if it is ready to serve reads.
    pub fn ready(&self, table: &str, property: &str) -> Option<&PropertySlot> {
        self.slots
            .get(&(table.to_string(), property.to_string()))
            .filter(|slot| slot.state == ReadinessState::Ready)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ready_slots_are_served() {
        let mut slots = PropertySlots::default();
        slots.insert("events", "plan", PropertySlot { column: "mat_plan".into(), state: ReadinessState::Ready });
        slots.insert("events", "seat", PropertySlot { column: "mat_seat".into(), state: ReadinessState::Backfilling });

        assert_eq!(slots.ready("events", "plan").unwrap().column, "mat_plan");
        assert!(slots.ready("events", "seat").is_none());
        assert!(slots.ready("persons", "plan").is_none());
    }
}
