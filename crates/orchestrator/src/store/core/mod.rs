pub(crate) mod context;

pub use context::StoreContext;
pub use context::StoreEvent;
