//! Scenarios, grouped by the story they tell:
//!
//! - `provisioning`: a ControlPlane converging into running workloads, then
//!   being upgraded
//! - `gating`: reconcilers waiting on prerequisites instead of failing
//! - `ownership`: deletion cascades and objects owned by someone else

mod helpers;

mod gating;
mod ownership;
mod provisioning;
