//! Signed data sync
//!
//! Pulls flight and news record sets from the authority, verifies their
//! signatures and keeps the local store current. When the remote is
//! unreachable or its payload fails verification, callers get the last data
//! the store held instead.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncService                                                    │
//! │  ├── SyncAdapter<Flights>                                      │
//! │  │   ├── CacheEntry (verified items + timestamp, TTL)          │
//! │  │   └── single-flight guard                                   │
//! │  └── SyncAdapter<News>                                         │
//! │                                                                 │
//! │  RemoteSource (HttpRemote in production)                       │
//! │  SignatureVerifier (RSA PKCS#1 v1.5 / SHA-256)                 │
//! │  LocalStore (redb)                                             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod adapter;
mod envelope;
mod outcome;
mod remote;
mod service;
mod topic;

pub use adapter::{SyncAdapter, SyncState};
pub use envelope::{EnvelopeError, SignedBatch};
pub use outcome::{DataSource, FallbackCause, SyncFailure, SyncOutcome};
pub use remote::{HttpRemote, RemoteSource};
pub use service::{SyncReport, SyncService};
pub use topic::{Flights, News, Topic};
