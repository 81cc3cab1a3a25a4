//! Vendor wire format types
//!
//! Serde models of each vendor's JSON bodies and streaming event grammar.
//! Bedrock speaks through the AWS SDK's own types, so only the native
//! Anthropic Messages API needs a hand-rolled protocol here.

pub mod anthropic;
