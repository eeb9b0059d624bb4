//! Translation of build targets into the plans the build engine runs.

use serde::Serialize;
use std::collections::BTreeMap;

use biome::{map_vars, ContainerDefinition, EnvTemplate};
use config_loader::{BuildTarget, BuildpackSpec};

use crate::error::BuildError;

/// What a target needs before its commands can run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseDeps {
    pub target_name: String,
    pub buildpacks: Vec<BuildpackSpec>,
    /// Auxiliary containers by name; `None` when the target declares none.
    pub resources: Option<BTreeMap<String, ContainerDefinition>>,
    pub environment_template: EnvTemplate,
}

/// The commands a target runs and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Phase {
    pub target_name: String,
    pub commands: Vec<String>,
    pub root: String,
}

pub fn target_to_phase_deps(target: &BuildTarget) -> Result<PhaseDeps, BuildError> {
    let buildpacks = target
        .dependencies
        .build
        .iter()
        .map(|dep| BuildpackSpec::parse(dep))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| BuildError::target(&target.name, err))?;

    let environment_template =
        map_vars(target.environment.as_slice()).map_err(|err| BuildError::target(&target.name, err))?;

    Ok(PhaseDeps {
        target_name: target.name.clone(),
        buildpacks,
        resources: container_map(&target.dependencies.containers),
        environment_template,
    })
}

fn container_map(
    defs: &BTreeMap<String, config_loader::ContainerDefinition>,
) -> Option<BTreeMap<String, ContainerDefinition>> {
    if defs.is_empty() {
        return None;
    }
    Some(
        defs.iter()
            .map(|(name, def)| (name.clone(), def.to_runtime()))
            .collect(),
    )
}

pub fn target_to_phase(target: &BuildTarget) -> Phase {
    Phase {
        target_name: target.name.clone(),
        commands: target.commands.clone(),
        root: target.root.clone(),
    }
}
