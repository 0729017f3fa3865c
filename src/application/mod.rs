//! Application services (use cases).
//!
//! These services orchestrate domain logic and coordinate adapters
//! to implement the signal pipeline:
//!
//! - [`validator`]: webhook authentication, schema and freshness checks
//! - [`router`]: strategy lookup and intent construction
//! - [`risk`]: position sizing and protective price levels
//! - [`store`]: durable per-symbol state and equity
//! - [`gateway`]: order submission, retries and reconciliation
//! - [`journal`]: background signal and trade journaling
//! - [`engine`]: the pipeline wiring everything together

pub mod engine;
pub mod gateway;
pub mod journal;
pub mod risk;
pub mod router;
pub mod store;
pub mod validator;
