//! Bidirectional message translation between the client and backend schemas

pub mod request;
pub mod response;
pub mod stream;

pub use request::{RoutePlan, TransformError, to_backend};
pub use response::{map_finish_reason, stable_call_id, to_client_final};
pub use stream::StreamRewriter;
