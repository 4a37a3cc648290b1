pub mod config;
pub mod duration;
pub mod engine;
pub mod error;
pub mod io;
pub mod navigation;
pub mod progress;
pub mod rollup;
pub mod rules;
pub mod sequencing;
pub mod session;
pub mod shape;
pub mod snapshot;
pub mod tracking;
pub mod tree;
pub mod types;

pub use config::EngineConfig;
pub use engine::{InitOutcome, NavigationOutcome, ProgressOutcome, SequencingEngine, TerminateOutcome};
pub use error::{Result, SeqError};
pub use session::{Session, SequencingState};
pub use snapshot::SessionSnapshot;
pub use tree::{ActivityId, ActivityTree};
pub use types::{NavigationRequest, SessionPhase};
