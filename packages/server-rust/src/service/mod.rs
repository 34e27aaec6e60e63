//! Service declaration and the invocation pipeline.
//!
//! A call flows through:
//!
//! 1. **Dispatch** (`dispatch`, `middleware`): load shedding and metrics
//! 2. **Pipeline** (`pipeline`): resolve -> authorize -> execute -> shape
//!    - `resolver`: identifiers to entities
//!    - `permission`: caller checks
//!    - `population`: cross-service field inlining, used by handlers
//!    - `shaper`: field filtering and keyed output
//! 3. **Publication** (`publisher`): route descriptors for the transports
//!
//! Services are declared with `descriptor` builders and loaded into the
//! `registry` from an explicit list of factories.

pub mod actions;
pub mod config;
pub mod descriptor;
pub mod dispatch;
pub mod middleware;
pub mod observer;
pub mod operation;
pub mod permission;
pub mod pipeline;
pub mod population;
pub mod publisher;
pub mod registry;
pub mod resolver;
pub mod shaper;

// Re-export key types for convenient access.
pub use config::ServerConfig;
pub use descriptor::{
    ActionDescriptor, ActionHandler, ActionMeta, ActionSpec, Permission, ServiceDescriptor,
    ServiceOptions,
};
pub use dispatch::Dispatcher;
pub use observer::{CompositeObserver, PipelineObserver};
pub use operation::{ActionOutput, Invocation, InvocationContext, ResolvedModel, Stage, SubInvoker};
pub use permission::PermissionGate;
pub use pipeline::InvocationPipeline;
pub use population::PopulationEngine;
pub use publisher::{ActionPublisher, RouteTable};
pub use registry::{LoadError, ServiceFactory, ServiceRegistry};
pub use resolver::ModelResolver;
pub use shaper::ResultShaper;
