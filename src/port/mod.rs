//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! Ports define the extension points in the hexagonal architecture.
//! They are traits that adapters implement to integrate with external
//! systems.
//!
//! # Architecture
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │      Application        │
//!                    │                         │
//!          ┌─────────┤  Domain + Port          ├─────────┐
//!          │         │                         │         │
//!          │         └─────────────────────────┘         │
//!          ▼                                             ▼
//!     ┌─────────┐                                  ┌───────────┐
//!     │Exchange │                                  │  Journal  │
//!     │ Adapter │                                  │  Adapter  │
//!     └─────────┘                                  └───────────┘
//! ```
//!
//! # Available Ports
//!
//! - [`outbound::exchange::ExchangeClient`] - Order placement, cancellation and queries
//! - [`outbound::journal::JournalSink`] - Append-only signal and trade records

pub mod outbound;
