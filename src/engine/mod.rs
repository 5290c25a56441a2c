pub mod discovery;
pub mod loader;
pub mod pipeline;
pub mod roots;
pub mod swap;
pub mod watch;

pub use discovery::{BuiltinDiscovery, DiscoveryReport};
pub use loader::{LoadError, LoaderBridge, ModuleLoader};
pub use pipeline::ReloadEngine;
pub use roots::{PendingModule, RootRegistry, WatchedRoot};
pub use swap::{SwapHandle, SwapRegistry, VersionSwapRegistry};
pub use watch::{ArtifactWatcher, WatchError};
