//! Client-side routing.
//!
//! - `routes`: route descriptors and the route table
//! - `guard`: the pure pre-transition access check
//! - `navigator`: the `Navigator` adapter seam and the `Router` that applies
//!   the guard to every transition

pub mod guard;
pub mod navigator;
pub mod routes;

pub use guard::{evaluate, GuardDecision};
pub use navigator::{NavCommand, Navigation, Navigator, Router};
pub use routes::{RedirectTarget, Requirements, RouteDescriptor, RouteError, RouteTable};
