//! Provider wire formats
//!
//! Plain serde structs for each family's request, response and stream chunk
//! JSON. Conversion and setup code build and read them; callers only ever
//! see canonical types or raw `serde_json::Value`s.

pub mod anthropic;
pub mod bedrock;
pub mod google;
pub mod openai;
