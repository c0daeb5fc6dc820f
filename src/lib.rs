//! D-Drive - local admin authentication and data integrity core
//!
//! This crate provides the security layer of the D-Drive photo archive:
//! - Admin password check (PBKDF2) with attempt lockout
//! - Admin session with inactivity and absolute limits
//! - Checksummed key-value persistence with tamper detection
//! - Text, tag and file name sanitization, image upload validation
//! - Hash-chained security audit log

pub mod cli;
pub mod config;
pub mod paths;
pub mod security;
pub mod storage;

pub use config::Config;
