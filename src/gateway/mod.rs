pub mod client;

pub use client::{GatewayError, InitializeFields, InitializeResponse, PaystackClient, Verification};
