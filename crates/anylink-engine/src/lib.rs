pub mod controller;
pub mod detect;
pub mod host;
pub mod memory;
pub mod messages;
pub mod registry;
pub mod resolve;
pub mod scanner;
pub mod synth;
pub mod undo;

pub use controller::{ControllerState, LinkController, LinkReport};
pub use detect::{HeuristicDetector, OverlayDetector};
pub use host::{DocumentView, Host, HostError, LinkStorage, NodeClass, NodeInfo, StorageError, TextProbe};
pub use memory::{MemoryDocument, MemoryStorage, OverlaySpec};
pub use messages::{PluginMessage, SelectionInfo, UiMessage};
pub use registry::{Clock, LinkFields, LinkRegistry, ManualClock, SystemClock};
pub use resolve::resolve_original;
pub use scanner::{DocumentSession, ScanOutcome, scan_container};
pub use synth::{OverlaySynthesizer, SynthStep, Synthesized, TeardownOutcome, plan_coverage};
