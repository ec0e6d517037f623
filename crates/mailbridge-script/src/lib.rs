//! # mailbridge-script
//!
//! Drives a desktop mail client through its AppleScript automation interface.
//!
//! This crate owns the only wire format the system speaks:
//!
//! - **Script literals** ([`literal`]): every user-supplied string is quoted
//!   before it is embedded into script source.
//! - **Delimited output** ([`wire`]): scripts emit control-character
//!   delimited records with escaped fields, decoded here with strict typed
//!   accessors.
//! - **Execution** ([`Bridge`], [`OsascriptBridge`]): runs a complete script
//!   with a timeout, launching the client or failing with
//!   [`BridgeError::NotRunning`].
//!
//! ## Example
//!
//! ```ignore
//! use mailbridge_script::{Bridge, BridgeConfig, OsascriptBridge, Script, literal, wire};
//!
//! let bridge = OsascriptBridge::new(BridgeConfig::new());
//! let body = format!(
//!     "tell application \"Mail\"\nreturn my rec({{name of account {}}})\nend tell",
//!     literal::string("Work"),
//! );
//! let raw = bridge.execute(&Script::new("account_name", body)).await?;
//! let records = wire::parse_records(&raw)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod bridge;
mod config;
mod error;
pub mod literal;
pub mod wire;

pub use bridge::{Bridge, OsascriptBridge, Script, classify_failure};
pub use config::{
    BridgeConfig, BridgeConfigBuilder, DEFAULT_APPLICATION, DEFAULT_LONG_TIMEOUT, DEFAULT_PROGRAM,
    DEFAULT_TIMEOUT,
};
pub use error::{BridgeError, Result};
pub use wire::Record;
