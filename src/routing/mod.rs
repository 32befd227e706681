//! Pure routing decision (C5): combines heuristic and model output into
//! `(taskType, reviewState, confidence, hasEvidence, shouldDrop)`.

pub mod decision;

pub use decision::{route, RoutingDecision, RoutingInput};
