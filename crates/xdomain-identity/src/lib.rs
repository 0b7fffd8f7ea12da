//! xdomain-identity — cross-domain visitor and session identity propagation.
//!
//! Identity lives in per-origin storage and travels between origins as URL
//! query parameters added to marked outbound links.

pub mod clock;
pub mod codec;
pub mod config;
pub mod decorator;
pub mod document;
pub mod identity;
pub mod log;
pub mod sink;
pub mod site;
pub mod storage;
pub mod tracker;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{apply_outbound, decode_composite, decode_inbound, encode_outbound};
pub use codec::{CompositeParam, InboundIdentity, OutboundIdentity};
pub use config::{SiteConfig, TagEnvironment, TrackingConfig};
pub use decorator::{DecorateOutcome, LinkDecorator};
pub use document::{Anchor, Document};
pub use identity::IdentityStore;
pub use log::TrackingLog;
pub use sink::{TracingSink, TrackingSink, TrackingSnapshot};
pub use site::{SiteProfile, SiteResolver};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, StorageScopes};
pub use tracker::{Navigation, PageEvent, Tracker};
pub use types::*;
