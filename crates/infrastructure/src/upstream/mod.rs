pub mod bootstrap;
pub mod pool;
pub mod transport;

pub use bootstrap::{BootstrapResolve, StaticResolver};
pub use pool::ResolverPool;
