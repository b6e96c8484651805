//! 统一的流式聊天分发库
//!
//! A logical model id resolves to a vendor, the vendor's dialect turns a generic
//! [`ChatGenerateRequest`] into its wire format, and the answer comes back as uniform
//! [`StreamUpdate`] frames folded into [`StreamingClientUpdate`]s for the caller.

pub mod accumulator;
pub mod cancel;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod intake;
pub mod provider;
pub mod rate_limit;
pub mod stream;
pub mod types;

pub use cancel::CancelHandle;
pub use client::{RelayClient, RelayClientBuilder};
pub use config::{
    Credential, LlmDescriptor, ModelCatalog, SourceSetup, build_client_from_descriptors,
    build_default_client,
};
pub use dispatch::{Dispatcher, UpdateStream};
pub use error::LLMError;
pub use intake::{IntakeContextName, map_options_to_intake_model};
pub use provider::{DynVendor, Vendor, VendorRegistry};
pub use types::*;
