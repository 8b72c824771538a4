pub mod relay_op;
pub mod session_id;

pub use relay_op::RelayOp;
pub use session_id::SessionId;
