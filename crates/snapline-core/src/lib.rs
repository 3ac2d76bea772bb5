//! Snapline Core
//!
//! The Chandy–Lamport marker protocol over directed FIFO channels.
//!
//! ## Core Components
//!
//! - **Channel**: unbounded FIFO queue of messages and markers between two processes
//! - **Process**: the marker-receipt state machine that captures local state and
//!   records in-flight messages per incoming channel
//! - **LocalStateRecorder**: the injectable capture of application state
//! - **GlobalSnapshot**: the cut read back after an epoch
//!
//! The core is purely reactive. Building a topology and deciding delivery
//! order is left to a driver (see `snapline-simulation`).
//!
//! ```rust
//! use std::sync::Arc;
//! use snapline_core::{Channel, NamedState, Process, ProcessId};
//!
//! let c12 = Arc::new(Channel::new("P1", "P2"));
//! let mut p2 = Process::new("P2", NamedState);
//! p2.attach_incoming(Arc::clone(&c12)).unwrap();
//!
//! c12.send_message("M1".to_string());
//! c12.send_marker();
//! let report = p2.deliver_from(&ProcessId::new("P1")).unwrap();
//!
//! assert!(report.captured && report.completed);
//! assert!(p2.channel_state(&"P1".into()).unwrap().is_empty());
//! ```

pub mod channel;
pub mod process;
pub mod recorder;
pub mod snapshot;
pub mod types;

pub use channel::Channel;
pub use process::{DeliveryReport, MarkerOutcome, Process};
pub use recorder::{FnRecorder, LocalStateRecorder, NamedState};
pub use snapshot::{GlobalSnapshot, ProcessSnapshot, RecordingState};
pub use types::{ChannelId, ChannelItem, ProcessId};

pub use snapline_error::{ProtocolError, ProtocolResult, TopologyError, TopologyResult};
