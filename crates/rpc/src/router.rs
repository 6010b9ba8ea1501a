//! Router composer: named procedure groups merged into one dot-addressed tree.
//!
//! Composition problems (duplicate paths, a path used both as a procedure and
//! as a group, malformed segments) are reported by [`RouterBuilder::build`] at
//! startup. A built [`Router`] never changes.

use kata_protocol::path::is_valid_segment;
use kata_protocol::{ProcedureInfo, ProcedurePath};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::error::{RpcError, RpcResult};
use crate::procedure::Procedure;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RouterError {
    #[error("Duplicate procedure path: {0}")]
    DuplicatePath(String),

    #[error("Path {procedure} is a procedure and also the namespace of {nested}")]
    PathConflict { procedure: String, nested: String },

    #[error("Invalid path segment {segment:?} in {path:?}")]
    InvalidSegment { path: String, segment: String },
}

#[derive(Default)]
pub struct RouterBuilder {
    entries: Vec<(Vec<String>, Procedure)>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn procedure(mut self, name: &str, procedure: Procedure) -> Self {
        self.entries.push((split(name), procedure));
        self
    }

    /// Mounts every procedure of `group` under `namespace` (may itself be dotted).
    pub fn merge(mut self, namespace: &str, group: RouterBuilder) -> Self {
        let prefix = split(namespace);
        for (segments, procedure) in group.entries {
            let mut full = prefix.clone();
            full.extend(segments);
            self.entries.push((full, procedure));
        }
        self
    }

    pub fn build(self) -> Result<Router, RouterError> {
        let mut procedures = BTreeMap::new();
        for (segments, procedure) in self.entries {
            let joined = segments.join(".");
            if let Some(bad) = segments.iter().find(|s| !is_valid_segment(s)) {
                return Err(RouterError::InvalidSegment {
                    path: joined,
                    segment: bad.clone(),
                });
            }
            let path = ProcedurePath::from_segments(segments).map_err(|_| {
                RouterError::InvalidSegment {
                    path: joined.clone(),
                    segment: String::new(),
                }
            })?;
            if procedures.insert(path, procedure).is_some() {
                return Err(RouterError::DuplicatePath(joined));
            }
        }

        // Extensions of a path sort directly after it.
        let paths: Vec<&ProcedurePath> = procedures.keys().collect();
        for pair in paths.windows(2) {
            if pair[1].starts_with(pair[0].segments()) {
                return Err(RouterError::PathConflict {
                    procedure: pair[0].to_string(),
                    nested: pair[1].to_string(),
                });
            }
        }

        Ok(Router { procedures })
    }
}

fn split(raw: &str) -> Vec<String> {
    raw.split('.').map(str::to_string).collect()
}

pub struct Router {
    procedures: BTreeMap<ProcedurePath, Procedure>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn resolve(&self, path: &ProcedurePath) -> RpcResult<&Procedure> {
        self.procedures
            .get(path)
            .ok_or_else(|| RpcError::not_found(format!("No procedure at {path}")))
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &ProcedurePath> {
        self.procedures.keys()
    }

    pub fn describe(&self) -> Vec<ProcedureInfo> {
        self.procedures
            .iter()
            .map(|(path, procedure)| ProcedureInfo {
                path: path.to_string(),
                kind: procedure.kind(),
                access: procedure.access(),
                input_schema: procedure.input_schema().clone(),
            })
            .collect()
    }
}
