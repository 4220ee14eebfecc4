//! Build graphs: plots, steps, and the typed inputs that wire them together.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::catalog::CatalogRef;
use crate::error::ApiError;
use crate::formula::Action;
use crate::formula::GatherDirective;
use crate::formula::SandboxPort;
use crate::impl_string_serde;
use crate::ordered::OrderedMap;
use crate::ware::WareID;

/// Name of a step within a plot. Unique per plot.
pub type StepName = String;
/// Name of a plot-level input or output.
pub type LocalLabel = String;

/// How a host path is made visible inside the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountMode {
    /// Read-only bind.
    Ro,
    /// Read-write bind. Makes the formula impure.
    Rw,
    /// Host path as overlay lower layer; writes land in the run directory.
    /// Makes the formula impure.
    Overlay,
}

impl MountMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountMode::Ro => "ro",
            MountMode::Rw => "rw",
            MountMode::Overlay => "overlay",
        }
    }
}

impl fmt::Display for MountMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MountMode {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ro" => Ok(MountMode::Ro),
            "rw" => Ok(MountMode::Rw),
            "overlay" => Ok(MountMode::Overlay),
            other => Err(ApiError::CodecSchema {
                detail: format!("unknown mount mode {other:?}"),
            }),
        }
    }
}

/// A host directory bound into the sandbox. Impure in `rw` and `overlay`
/// modes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mount {
    pub mode: MountMode,
    pub host_path: String,
}

/// A dataflow edge from a prior step's output. An empty step name refers to
/// the plot's own inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pipe {
    pub step_name: StepName,
    pub output_name: LocalLabel,
}

impl fmt::Display for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "pipe:{}:{}", self.step_name, self.output_name)
    }
}

impl FromStr for Pipe {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("pipe"), Some(step), Some(output)) if !output.is_empty() => Ok(Pipe {
                step_name: step.to_string(),
                output_name: output.to_string(),
            }),
            _ => Err(ApiError::CodecSchema {
                detail: format!("invalid pipe {s:?}: expected `pipe:<step>:<output>`"),
            }),
        }
    }
}

impl_string_serde!(Pipe);

/// An ingest reads mutable state from the host at resolution time.
/// Currently only git: `ingest:git:<hostPath>:<ref>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ingest {
    pub host_path: String,
    pub git_ref: String,
}

/// One typed input to a plot or protoformula.
///
/// String forms, in the order tried by the parser:
/// `catalog:<module>:<release>:<item>`, `ware:<packtype>:<hash>`,
/// `mount:<mode>:<hostPath>`, `literal:<value>`, `pipe:<step>:<output>`,
/// `ingest:git:<hostPath>:<ref>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlotInput {
    CatalogRef(CatalogRef),
    Ware(WareID),
    Mount(Mount),
    Literal(String),
    Pipe(Pipe),
    Ingest(Ingest),
}

impl fmt::Display for PlotInput {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PlotInput::CatalogRef(r) => write!(f, "catalog:{r}"),
            PlotInput::Ware(w) => write!(f, "ware:{w}"),
            PlotInput::Mount(m) => write!(f, "mount:{}:{}", m.mode, m.host_path),
            PlotInput::Literal(l) => write!(f, "literal:{l}"),
            PlotInput::Pipe(p) => write!(f, "{p}"),
            PlotInput::Ingest(i) => write!(f, "ingest:git:{}:{}", i.host_path, i.git_ref),
        }
    }
}

impl FromStr for PlotInput {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, rest) = s.split_once(':').ok_or_else(|| ApiError::CodecSchema {
            detail: format!("invalid plot input {s:?}: missing tag"),
        })?;
        match tag {
            "catalog" => Ok(PlotInput::CatalogRef(rest.parse()?)),
            "ware" => Ok(PlotInput::Ware(rest.parse()?)),
            "mount" => {
                let (mode, host_path) = rest.split_once(':').ok_or_else(|| ApiError::CodecSchema {
                    detail: format!("invalid mount {s:?}: expected `mount:<mode>:<hostPath>`"),
                })?;
                Ok(PlotInput::Mount(Mount {
                    mode: mode.parse()?,
                    host_path: host_path.to_string(),
                }))
            }
            "literal" => Ok(PlotInput::Literal(rest.to_string())),
            "pipe" => Ok(PlotInput::Pipe(s.parse()?)),
            "ingest" => {
                let mut parts = rest.splitn(3, ':');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some("git"), Some(host_path), Some(git_ref)) => Ok(PlotInput::Ingest(Ingest {
                        host_path: host_path.to_string(),
                        git_ref: git_ref.to_string(),
                    })),
                    _ => Err(ApiError::CodecSchema {
                        detail: format!("invalid ingest {s:?}: expected `ingest:git:<hostPath>:<ref>`"),
                    }),
                }
            }
            other => Err(ApiError::CodecSchema {
                detail: format!("unknown plot input tag {other:?} in {s:?}"),
            }),
        }
    }
}

impl_string_serde!(PlotInput);

/// One step of a plot before lowering: typed inputs keyed by sandbox port, an
/// action, and directives for gathering outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protoformula {
    pub inputs: OrderedMap<SandboxPort, PlotInput>,
    pub action: Action,
    pub outputs: OrderedMap<LocalLabel, GatherDirective>,
}

/// One node of a plot: either a single execution unit or a nested plot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Protoformula(Protoformula),
    Plot(Plot),
}

/// A declarative build graph.
///
/// `inputs`, `steps`, and `outputs` are insertion-ordered; that order is part
/// of the document identity and also serves as the deterministic tie-break
/// when steps are scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plot {
    pub inputs: OrderedMap<LocalLabel, PlotInput>,
    pub steps: OrderedMap<StepName, Step>,
    pub outputs: OrderedMap<LocalLabel, Pipe>,
}

/// Capsule envelope for [`Plot`]: `{"plot.v1": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlotCapsule {
    #[serde(rename = "plot.v1")]
    V1(Plot),
}

/// Execution options for a whole plot run.
#[derive(Debug, Clone, Default)]
pub struct PlotExecConfig {
    /// Execute nested plot steps instead of failing with `plot-not-lowered`.
    pub recursive: bool,
    /// Options forwarded to each formula execution.
    pub formula_exec_config: crate::formula::FormulaExecConfig,
}
