//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Request (method, path)
//!     → router.rs (method gate, routes in declaration order)
//!     → pattern.rs (compile through the bounded cache, regex match)
//!     → handler({matched, params, next}) or next()
//! ```
//!
//! # Design Decisions
//! - Deterministic: first match in declaration order wins
//! - Routers are ordinary middleware and compose through the chain
//! - Compiled patterns are shared process-wide and never evicted

pub mod pattern;
pub mod router;

pub use pattern::{match_pattern, MatchOptions, PatternMatch};
pub use router::{Handler, RouteMatch, Router};
