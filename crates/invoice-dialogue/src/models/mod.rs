pub mod decision;
pub mod plan;
pub mod routing;
pub mod slots;
pub mod state;

pub use decision::DecisionKind;
pub use plan::{NormalizedIntent, ResolvedEntities, SemanticPlan};
pub use routing::{DateRange, QueryMode, RoutingDecision};
pub use slots::{SlotDelta, SlotKey, Slots};
pub use state::{
    ActiveTopic, ConversationState, EntityRole, HistoryEntry, HistoryRole, IntentShape, Period,
    PeriodCache, TimeWindowKind,
};
