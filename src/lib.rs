//! Mixnet Directory
//!
//! Bookkeeping core of a mixnet directory: network monitors submit up/down
//! observations for mix nodes and gateways, the directory rolls them into
//! uptime reports, keeps a reputation per node and publishes the topology of
//! nodes eligible to carry traffic.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Configuration management
//! ├── clock.rs       - Time source (system / manual)
//! ├── error.rs       - Store and directory errors
//! ├── address.rs     - Host normalization for address comparison
//! ├── sanitize.rs    - Markup stripping for request payloads
//! ├── models/        - Observations, reports, nodes, topology
//! ├── database/      - StatusStore trait, PostgreSQL and in-memory backends
//! │   ├── pool.rs          - PostgreSQL pool and schema
//! │   ├── observations.rs  - Observation log
//! │   ├── reports.rs       - Status reports
//! │   ├── nodes.rs         - Registered / removed nodes
//! │   └── memory.rs        - In-memory store
//! ├── uptime.rs      - Uptime percentages over windows
//! ├── report.rs      - Report building from observations
//! ├── reputation/    - Reputation policy and manager
//! ├── admission/     - Registration checks and eviction
//! ├── topology.rs    - Single-flight topology cache
//! ├── scheduler.rs   - Daily refresh and retention purge
//! ├── service.rs     - DirectoryService facade
//! └── api/           - HTTP API endpoints
//! ```

pub mod address;
pub mod admission;
pub mod api;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod report;
pub mod reputation;
pub mod sanitize;
pub mod scheduler;
pub mod service;
pub mod topology;
pub mod uptime;

// Re-export main types for convenience
pub use config::DirectoryConfig;
pub use error::{ConflictReason, DirectoryError, StoreError};
pub use service::DirectoryService;

pub use clock::{Clock, ManualClock, SystemClock};
pub use database::{DatabasePool, MemoryStore, NodeFilter, StatusStore};
pub use models::{
    BatchNodeStatus, BatchStatusReport, GatewayRegistrationInfo, IpVersion, MixRegistrationInfo,
    NodeInfo, NodeKind, NodeState, NodeStatus, Observation, RegisteredNode, StatusReport,
    Topology,
};

// Re-export component types
pub use admission::{AdmissionController, EvictionPolicy};
pub use report::ReportBuilder;
pub use reputation::{ReputationManager, ReputationPolicy};
pub use scheduler::Scheduler;
pub use topology::{StoreTopologySource, TopologyCache, TopologySource, TopologyView};
pub use uptime::{ReportWindow, Uptime, UptimeCalculator, UptimeStrategy, UptimeWindow};
