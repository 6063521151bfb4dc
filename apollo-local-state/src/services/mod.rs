//! Implementation of the local state handler as a tower service.

pub mod local_state;

pub use local_state::LocalState;
pub use local_state::LocalStateLayer;
pub use local_state::LocalStateService;
pub use local_state::Operation;
pub use local_state::Request;
pub use local_state::Response;
