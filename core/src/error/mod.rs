pub mod graph;
pub mod option;
pub mod persist;
pub mod proc;
pub mod task;

pub use graph::GraphError;
pub use option::OptionError;
pub use persist::PersistError;
pub use proc::ProcError;
pub use task::TaskError;
