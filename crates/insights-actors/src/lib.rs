pub mod actors;
pub mod error;
pub mod ingest;
pub mod runtime;

pub use runtime::{Actor, ActorContext, ActorRef, PersistentState, Runtime};
