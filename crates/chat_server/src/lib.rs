//! HTTP side of the chat stream: admission control, the tool event
//! multiplexer, and the axum routes that expose them.

pub mod auth;
pub mod error;
pub mod gate;
pub mod injector;
pub mod multiplexer;
pub mod quota;
pub mod routes;

pub use auth::{AllowAnonymous, SharedSecretVerifier, TokenVerifier};
pub use error::GateError;
pub use gate::{ChatGate, GateSettings, PreparedTurn, TurnReport};
pub use injector::{DataLookupInjector, ImageInjector, Injection, InjectorRegistry, TextInjector};
pub use multiplexer::{ChannelSink, FrameSink, Multiplexer, TurnOutcome, TurnSummary};
pub use quota::{
    Clock, InMemoryQuotaStore, ManualClock, QuotaDecision, QuotaPolicy, QuotaStore, SystemClock,
};
pub use routes::{router, spawn_quota_janitor, AppState};
