/* src/cli/core/src/build/mod.rs */

mod critical;
mod error;
mod graph;
mod hooks;
mod manifest;
mod output;
mod queue;
mod render;
mod route;
mod run;

#[cfg(test)]
mod tests;

pub use hooks::{CommandHooks, NoopHooks, RenderHooks};
pub use run::{BuildPlan, BuildReport, Pipeline, TEMP_DIR, WATCHDOG_AFTER, run_build};
