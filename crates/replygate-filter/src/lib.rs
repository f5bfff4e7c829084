pub mod gate;
pub mod merge;
pub mod scope;
pub mod sink;

pub use gate::Gate;
pub use merge::MergeCoordinator;
pub use scope::is_in_scope;
pub use sink::SystemContextSink;
