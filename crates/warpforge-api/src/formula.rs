//! Execution units: formulas, actions, and run records.
//!
//! A formula is the fully-resolved form of one protoformula: every input is
//! a concrete ware, mount, or literal. It is the unit of sandboxed execution
//! and of memoization: its identity is the content hash of its canonical
//! encoding.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ApiError;
use crate::impl_string_serde;
use crate::ordered::OrderedMap;
use crate::plot::Mount;
use crate::plot::MountMode;
use crate::ware::Packtype;
use crate::ware::WareID;
use crate::ware::WarehouseAddr;

/// Name of a formula (or step) output.
pub type OutputName = String;

/// Where an input lands in the sandbox: an absolute path, or an environment
/// variable. Ports are map keys with structural equality; a port is unique
/// within a formula's input set.
///
/// String forms: `/some/path` or `$SOME_VAR`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SandboxPort {
    Path(String),
    Var(String),
}

impl fmt::Display for SandboxPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SandboxPort::Path(p) => f.write_str(p),
            SandboxPort::Var(v) => write!(f, "${v}"),
        }
    }
}

impl FromStr for SandboxPort {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(var) = s.strip_prefix('$') {
            if var.is_empty() {
                return Err(ApiError::CodecSchema {
                    detail: "sandbox variable name is empty".to_string(),
                });
            }
            Ok(SandboxPort::Var(var.to_string()))
        } else if s.starts_with('/') {
            Ok(SandboxPort::Path(s.to_string()))
        } else {
            Err(ApiError::CodecSchema {
                detail: format!("invalid sandbox port {s:?}: expected an absolute path or `$VAR`"),
            })
        }
    }
}

impl_string_serde!(SandboxPort);

/// What a formula runs. Exactly one variant is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Debug action: does nothing, exits 0.
    Echo {},
    /// Run an argv directly.
    Exec {
        command: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        network: Option<bool>,
    },
    /// Materialize `contents` into a script file and run it with
    /// `interpreter`.
    Script {
        interpreter: String,
        contents: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        network: Option<bool>,
    },
}

impl Action {
    /// Whether the action asked for network access. Default deny.
    pub fn wants_network(&self) -> bool {
        match self {
            Action::Echo {} => false,
            Action::Exec { network, .. } | Action::Script { network, .. } => network.unwrap_or(false),
        }
    }
}

/// How one output is captured after the action finishes.
///
/// If `from` is a variable port, `packtype` and `filters` must be absent (the
/// output is a string, not a packed fileset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherDirective {
    pub from: SandboxPort,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packtype: Option<Packtype>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<OrderedMap<String, String>>,
}

/// A fully-resolved formula input.
///
/// String forms: `ware:<packtype>:<hash>`, `mount:<mode>:<hostPath>`,
/// `literal:<value>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FormulaInput {
    Ware(WareID),
    Mount(Mount),
    Literal(String),
}

impl fmt::Display for FormulaInput {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FormulaInput::Ware(w) => write!(f, "ware:{w}"),
            FormulaInput::Mount(m) => write!(f, "mount:{}:{}", m.mode, m.host_path),
            FormulaInput::Literal(l) => write!(f, "literal:{l}"),
        }
    }
}

impl FromStr for FormulaInput {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, rest) = s.split_once(':').ok_or_else(|| ApiError::CodecSchema {
            detail: format!("invalid formula input {s:?}: missing tag"),
        })?;
        match tag {
            "ware" => Ok(FormulaInput::Ware(rest.parse()?)),
            "mount" => {
                let (mode, host_path) = rest.split_once(':').ok_or_else(|| ApiError::CodecSchema {
                    detail: format!("invalid mount {s:?}: expected `mount:<mode>:<hostPath>`"),
                })?;
                Ok(FormulaInput::Mount(Mount {
                    mode: mode.parse()?,
                    host_path: host_path.to_string(),
                }))
            }
            "literal" => Ok(FormulaInput::Literal(rest.to_string())),
            other => Err(ApiError::CodecSchema {
                detail: format!("unknown formula input tag {other:?} in {s:?}"),
            }),
        }
    }
}

impl_string_serde!(FormulaInput);

impl FormulaInput {
    /// An input is impure when re-running could observe different state:
    /// writable and overlay mounts.
    pub fn is_impure(&self) -> bool {
        matches!(
            self,
            FormulaInput::Mount(Mount {
                mode: MountMode::Rw | MountMode::Overlay,
                ..
            })
        )
    }
}

/// A single sandboxed execution unit with all inputs resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    pub inputs: OrderedMap<SandboxPort, FormulaInput>,
    pub action: Action,
    pub outputs: OrderedMap<OutputName, GatherDirective>,
}

impl Formula {
    /// A formula is pure when none of its inputs are. Only pure formulas are
    /// memoized.
    pub fn is_pure(&self) -> bool {
        self.inputs.values().all(|input| !input.is_impure())
    }
}

/// Capsule envelope for [`Formula`]: `{"formula.v1": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormulaCapsule {
    #[serde(rename = "formula.v1")]
    V1(Formula),
}

/// Warehouse addresses to try for each ware a formula needs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormulaContext {
    pub warehouses: OrderedMap<WareID, WarehouseAddr>,
}

/// Capsule envelope for [`FormulaContext`]: `{"context.v1": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormulaContextCapsule {
    #[serde(rename = "context.v1")]
    V1(FormulaContext),
}

/// The `formula.wf` document: a formula plus where its wares can be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaAndContext {
    pub formula: FormulaCapsule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<FormulaContextCapsule>,
}

/// The record of one formula execution. Append-only; keyed in the memo cache
/// by `formula_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique id of this run. Not part of the memo key.
    pub guid: String,
    /// Wall-clock seconds since the Unix epoch at completion.
    pub time: i64,
    /// Content hash of the canonical encoding of the formula that ran.
    #[serde(rename = "formulaID")]
    pub formula_id: String,
    pub exitcode: i32,
    pub results: OrderedMap<OutputName, FormulaInput>,
}

/// Execution options for one formula.
#[derive(Debug, Clone, Default)]
pub struct FormulaExecConfig {
    /// Stream the action's stdio to the user instead of buffering it.
    pub interactive: bool,
    /// Skip the memo cache entirely: no probe, no write.
    pub disable_memoization: bool,
    /// Wall-clock limit for the action; on expiry the sandbox is torn down.
    pub timeout: Option<std::time::Duration>,
}
