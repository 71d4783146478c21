//! Page tree and widget-slot versioning engine
//!
//! Every page of the tree exists in two parallel versions, a draft that
//! editors change and an online version that visitors see. Each version
//! carries its own metadata and a fixed-size array of widget slots sized by
//! its page model. Sibling positions stay contiguous under insert, delete,
//! move and publish, and every operation is one atomic transaction against a
//! small row store.
//!
//! ```no_run
//! use std::sync::Arc;
//! use pagetree::{EnvBuilder, PageModelRegistry, PageVersion, ServiceBuilder, WidgetTypeRegistry};
//!
//! # fn main() -> pagetree::Result<()> {
//! let env = EnvBuilder::new().open("/tmp/pages")?;
//! let models = Arc::new(PageModelRegistry::new().with_model("home", 3));
//! let widgets = Arc::new(WidgetTypeRegistry::new());
//! let service = ServiceBuilder::new().build(env, models, widgets)?;
//!
//! let about = service.add_page("homepage", "about", "free", PageVersion::new("home", 3))?;
//! service.set_page_online(&about.code)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod env;
pub mod error;
pub mod events;
pub mod gateway;
pub mod lookup;
pub mod model;
pub mod position;
pub mod service;
pub mod slots;
pub mod table;
pub mod tree;
pub mod txn;

// Re-exports
pub use config::{DeletePolicy, RootSeed, ServiceBuilder, ServiceConfig};
pub use env::{DurabilityMode, EnvBuilder, Environment};
pub use error::{Error, PersistenceError, Result};
pub use events::{ActionLog, PageEvent, PageEventSink, TracingSink};
pub use lookup::{PageModelLookup, PageModelRegistry, WidgetTypeInfo, WidgetTypeLookup, WidgetTypeRegistry};
pub use model::{PageNode, PageVersion, PublishState, Timestamp, VersionKind, WidgetInstance};
pub use service::{PageTreeService, PagesStatus};
pub use slots::{WidgetSlotTable, DEFAULT_SENTINEL_FRAME};
pub use tree::{PageTree, PageTreeStore};
pub use txn::Transaction;

/// A read-only transaction
pub type RoTxn<'env> = Transaction<'env, txn::Read>;
/// A read-write transaction
pub type RwTxn<'env> = Transaction<'env, txn::Write>;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
