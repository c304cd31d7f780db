//! Device descriptors, records, and the instance graph for iocforge.
//!
//! One build accumulates its declarations into an [`InstanceGraph`]: device
//! definitions and instances, validated records, substitution instances,
//! and data files. Closing the graph resolves deferred record links, and
//! [`planner::plan`] linearises device initialisation into the command plan
//! the emitters consume.

pub mod datafile;
pub mod device;
pub mod error;
pub mod graph;
pub mod planner;
pub mod record;
pub mod vectors;

pub use datafile::{DataFile, DataSource};
pub use device::{DeviceDefinition, DeviceInstance, Phase, PhaseHooks};
pub use error::{CoreError, Result};
pub use graph::InstanceGraph;
pub use planner::{plan, CommandPlan};
pub use record::{FieldValue, Link, LinkSpec, PrefixNaming, Record, RecordNaming, VerbatimNaming};
pub use vectors::VectorAllocator;
