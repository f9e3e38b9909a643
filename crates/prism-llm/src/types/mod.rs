//! Canonical, provider-agnostic types
//!
//! Every wire format converts to and from these.

pub mod message;
pub mod params;
pub mod request;
pub mod response;

pub use message::{ContentPart, ImageSource, Message, Role};
pub use params::CallParams;
pub use request::{CallRequest, ToolChoice};
pub use response::{CostMetadata, FinishReason, Usage};
