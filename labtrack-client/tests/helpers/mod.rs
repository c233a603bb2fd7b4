//! Test Helper Utilities
//!
//! Shared utilities for testing labtrack-client

#![allow(dead_code)]

pub mod auth_stub;
pub mod multipart;

pub use auth_stub::{
    auth_session, demo_profile, expired_token, signed_in, signed_out, token_expiring_in,
    ScriptedAuth, DEMO_EMAIL, DEMO_PASSWORD,
};
pub use multipart::multipart_body;

pub const MB: u64 = 1024 * 1024;
