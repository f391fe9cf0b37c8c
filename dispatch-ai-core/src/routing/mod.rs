pub mod planner;

pub use planner::{PlanIntent, PlanMethod, RoutingContext, RoutingPlan, RoutingPlanner};
