pub mod cli;
pub mod drain_engine;
pub mod drain_exclusions;
pub mod pool_controller;
pub mod rollout_planner;
