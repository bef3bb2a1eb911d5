//! dartscope
//!
//! A semantic code-intelligence engine for Dart workspaces.
//!
//! # Architecture
//!
//! The engine keeps a queryable in-memory model of a codebase and its
//! dependencies, synchronized with the filesystem incrementally:
//!
//! 1. **Index**: per-package symbol/occurrence/relationship store with a
//!    derived parent hierarchy and call graph, fed by SCIP-shaped
//!    documents.
//! 2. **Incremental indexer**: content-hash change detection, per-file
//!    re-analysis, a disk-backed cache and a filesystem watcher.
//! 3. **Package registry**: federation across the workspace's packages
//!    plus pre-built immutable indexes for the SDK, framework packages
//!    and pub dependencies, queried in provenance order.
//! 4. **Query engine**: a small piped DSL (`find *Service kind:class |
//!    members`) parsed into commands and executed against the registry.
//!
//! # Usage
//!
//! ```ignore
//! use dartscope::registry::{PackageRegistry, RegistryOptions};
//! use dartscope::dsl::executor::QueryExecutor;
//!
//! let registry = PackageRegistry::open("/path/to/app".as_ref(), RegistryOptions::default()).await?;
//! let executor = QueryExecutor::new(&registry);
//! let result = executor.execute("hierarchy AuthService");
//! println!("{}", result.to_text());
//! ```

pub mod analyzer;
pub mod cache;
pub mod discovery;
pub mod dsl;
pub mod error;
pub mod external;
pub mod index;
pub mod indexer;
pub mod manifest;
pub mod registry;
pub mod scip;
pub mod symbol;
pub mod types;

pub use analyzer::{Analyzer, FileEvent, ResolvedUnit};
pub use cache::IndexCache;
pub use discovery::{PackageEntry, discover_packages};
pub use dsl::executor::QueryExecutor;
pub use dsl::result::QueryResult;
pub use error::{EngineError, QueryError};
pub use external::ExternalIndexBuilder;
pub use index::Index;
pub use indexer::{IncrementalIndexer, IndexerOptions, UpdateEvent};
pub use registry::{PackageRegistry, RegistryOptions, SearchScope};
pub use types::*;
