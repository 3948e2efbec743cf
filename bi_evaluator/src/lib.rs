//! # BI Evaluator
//!
//! Evaluates compiled aggregation trees against live status data and serves
//! table requests on top of the compilation cache.

pub mod assumptions;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod rows;
pub mod service;
pub mod state;
pub mod status;
pub mod treestate;

// Convenience re-exports
pub use assumptions::{
    AssumptionKey, AssumptionMap, AssumptionStore, JsonFileAssumptionStore, MemoryAssumptionStore,
};
pub use error::{EvaluationError, EvaluationResult, StoreError};
pub use evaluator::{status_tree_depth, EvaluatedNode, Evaluator};
pub use functions::{AggregationFunction, AggregationInput, FunctionRegistry};
pub use rows::{AggregationRow, HostColumns, HostTableQuery, TableQuery};
pub use service::BiService;
pub use state::State;
pub use status::{HostStatus, ServiceStatus, StaticStatusSource, StatusSnapshot, StatusSource};
pub use treestate::{JsonFileTreeStateStore, MemoryTreeStateStore, TreeState, TreeStateStore};

pub mod prelude {
    pub use crate::evaluator::{EvaluatedNode, Evaluator};
    pub use crate::functions::FunctionRegistry;
    pub use crate::rows::{AggregationRow, HostTableQuery, TableQuery};
    pub use crate::service::BiService;
    pub use crate::state::State;
    pub use crate::status::{StatusSnapshot, StatusSource};

    pub use bi_compiler::{
        CompiledInterior, CompiledNode, ConfigSource, HostSpec, Identity, TopologySource,
    };
}
