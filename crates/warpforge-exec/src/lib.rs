//! Sandboxed formula execution.
//!
//! Turns a [`warpforge_api::Formula`] into a running OCI container and a
//! [`warpforge_api::RunRecord`]: inputs staged from the content-addressed
//! ware cache (fetched through the external packer when absent), the action
//! run under an isolated namespace set, outputs packed back into wares, and
//! the result memoized when the formula is pure.
//!
//! # Modules
//!
//! - [`executor`] - Stage → launch → gather → record
//! - [`rio`] - External packer subprocess client
//! - [`oci`] - Container bundle (`config.json`) assembly
//! - [`error`] - Coded execution errors

pub mod error;
pub mod executor;
pub mod oci;
pub mod rio;

pub use error::ExecError;
pub use error::Result;
pub use executor::ExecConfig;
pub use executor::execute;
pub use executor::script_bytes;
pub use executor::validate_formula;
pub use rio::Rio;
