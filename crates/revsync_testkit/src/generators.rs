//! Property-based test generators using proptest.
//!
//! Provides strategies for generating widgets, documents and session step
//! sequences.

use crate::faults::Fault;
use crate::fixtures::Widget;
use proptest::prelude::*;
use revsync_protocol::{Document, EntityId};

/// Strategy for generating entity IDs.
pub fn entity_id_strategy() -> impl Strategy<Value = EntityId> {
    prop::array::uniform16(any::<u8>()).prop_map(EntityId::from_bytes)
}

/// Strategy for generating widgets.
pub fn widget_strategy() -> impl Strategy<Value = Widget> {
    (
        prop::string::string_regex("[a-z][a-z0-9-]{0,15}").expect("Invalid regex"),
        0u32..1000,
        prop::collection::vec(prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex"), 0..3),
    )
        .prop_map(|(name, count, tags)| Widget { name, count, tags })
}

/// Strategy for generating documents.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    widget_strategy().prop_map(|w| Document::from_entity(&w).expect("widget serializes"))
}

/// One step applied to a session.
///
/// Slots pick among the entities created so far, modulo their number, so
/// every generated sequence is valid whatever came before.
#[derive(Debug, Clone)]
pub enum Step {
    /// Persist a new widget.
    Create(Widget),
    /// Replace a tracked widget.
    Update {
        /// Which tracked widget.
        slot: usize,
        /// New state.
        widget: Widget,
    },
    /// Schedule a tracked widget for deletion.
    Remove {
        /// Which tracked widget.
        slot: usize,
    },
    /// Write every pending change.
    Flush,
}

/// Strategy for generating session steps.
pub fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => widget_strategy().prop_map(Step::Create),
        3 => (any::<usize>(), widget_strategy())
            .prop_map(|(slot, widget)| Step::Update { slot, widget }),
        1 => any::<usize>().prop_map(|slot| Step::Remove { slot }),
        2 => Just(Step::Flush),
    ]
}

/// Strategy for generating a sequence of steps.
pub fn step_sequence_strategy(min_steps: usize, max_steps: usize) -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(step_strategy(), min_steps..max_steps)
}

/// Strategy for picking a failure point.
pub fn fault_strategy() -> impl Strategy<Value = Fault> {
    prop::sample::select(Fault::ALL.to_vec())
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
