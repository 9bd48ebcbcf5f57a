//! Module-lifecycle driven initial content loading.
//!
//! A host delivers lifecycle events for its modules to a [`ContentLoader`].
//! For each installed or updated module the loader:
//!
//! 1. parses the module's `Initial-Content` header into path entries
//! 2. defers the module while a reader one of its entries needs is missing
//! 3. imports every entry through the `contentseed-import` readers
//! 4. records what it created in a per-module content record in the store
//!
//! Uninstalling a module removes the recorded nodes again.
//!
//! ```text
//! Installed ─▶ Pending ─▶ ReadyCheck ─┬─▶ Deferred ──(reader registered)──┐
//!                                     └─▶ Loading ◀──────────────────────┘
//!                                            ├─▶ Loaded
//!                                            └─▶ Failed
//! Uninstalled ─▶ Unloading ─▶ Unloaded
//! ```

mod bookkeeping;
pub mod config;
mod error;
mod events;
mod installer;
mod loader;
pub mod module;
mod tracker;

pub use bookkeeping::{ModuleContentInfo, ModuleContentRecord};
pub use config::{LoaderConfig, TargetFilter};
pub use error::{LoaderError, LoaderResult};
pub use events::{ModuleEventKind, ModuleJob, ModuleState};
pub use loader::ContentLoader;
pub use module::{ContentModule, ModuleManifest, ModulePackage, ModulePackageBuilder};
pub use tracker::{DeferredModule, ReadinessTracker};
