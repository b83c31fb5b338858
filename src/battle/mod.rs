pub mod ai;
pub mod calculators;
pub mod catch;
pub mod commands;
pub mod opponent;
pub mod rng;
pub mod session;
pub mod state;
pub mod stats;
pub mod turn_orchestrator;

#[cfg(test)]
pub(crate) mod tests;
