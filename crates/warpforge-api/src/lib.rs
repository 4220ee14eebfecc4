//! Core domain types and canonical serialization for warpforge.
//!
//! This crate provides the foundational types for the warpforge build tool.
//! It is designed to be lightweight with minimal dependencies, allowing other
//! crates to depend on it without pulling in async runtimes or filesystem
//! code.
//!
//! # Modules
//!
//! - [`ware`] - Content-addressed artifact identity (WareID, Packtype, WarehouseAddr)
//! - [`catalog`] - Catalog records (Module, Release, Mirrors, CatalogRef)
//! - [`plot`] - Build graphs (Plot, Step, PlotInput, Pipe)
//! - [`formula`] - Execution units (Formula, Action, RunRecord)
//! - [`ordered`] - Insertion-ordered maps with schema-significant key order
//! - [`codec`] - Canonical JSON encode/decode and content hashing
//! - [`error`] - Coded error taxonomy shared across all crates
//!
//! # Design
//!
//! - Key insertion order is part of the schema: encoding the same value twice
//!   produces byte-identical output, which is what content hashes are built on.
//! - Union types (PlotInput, Action, Step) are enums with exactly-one-variant
//!   semantics enforced at decode time.
//! - No I/O and no async code; everything here is pure data.

pub mod catalog;
pub mod codec;
pub mod error;
pub mod formula;
pub mod ordered;
pub mod plot;
pub mod ware;

pub use catalog::CatalogMirrors;
pub use catalog::CatalogMirrorsCapsule;
pub use catalog::CatalogModule;
pub use catalog::CatalogModuleCapsule;
pub use catalog::CatalogRef;
pub use catalog::Module;
pub use catalog::ModuleCapsule;
pub use catalog::Release;
pub use codec::content_hash;
pub use codec::decode;
pub use codec::encode;
pub use codec::formula_id;
pub use error::ApiError;
pub use error::ErrorCode;
pub use formula::Action;
pub use formula::Formula;
pub use formula::FormulaAndContext;
pub use formula::FormulaCapsule;
pub use formula::FormulaContext;
pub use formula::FormulaContextCapsule;
pub use formula::FormulaExecConfig;
pub use formula::FormulaInput;
pub use formula::GatherDirective;
pub use formula::RunRecord;
pub use formula::SandboxPort;
pub use ordered::OrderedMap;
pub use plot::Ingest;
pub use plot::Mount;
pub use plot::MountMode;
pub use plot::Pipe;
pub use plot::Plot;
pub use plot::PlotCapsule;
pub use plot::PlotExecConfig;
pub use plot::PlotInput;
pub use plot::Protoformula;
pub use plot::Step;
pub use ware::Packtype;
pub use ware::WareID;
pub use ware::WarehouseAddr;

/// Implements `Serialize`/`Deserialize` through a type's `Display` and
/// `FromStr` impls, so the type reads and writes as a single JSON string.
/// Works for map keys too.
macro_rules! impl_string_serde {
    ($ty:ty) => {
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct Vis;
                impl serde::de::Visitor<'_> for Vis {
                    type Value = $ty;

                    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                        write!(f, "a string encoding a {}", stringify!($ty))
                    }

                    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                        v.parse().map_err(E::custom)
                    }
                }
                deserializer.deserialize_str(Vis)
            }
        }
    };
}
pub(crate) use impl_string_serde;
