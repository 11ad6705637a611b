//! Action execution through a discriminator-keyed registry.

mod registry;

pub use registry::{ActionHandler, ActionRegistry, DoneHandler, ScrollHandler};
