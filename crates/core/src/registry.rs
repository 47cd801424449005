//! Scene registry: the validated rotation order and the scene queries behind it.

use std::collections::BTreeSet;
use std::fmt;

use autocast_protocol::{
    CurrentProgramScene, SceneItem, SceneItemList, SceneList, SceneTarget, request,
};
use autocast_runtime::{ObsClient, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Name of a scene in the broadcast application.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(String);

impl SceneId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SceneId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for SceneId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for SceneId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Position in the rotation. Counts ticks; the scene is `position mod len`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SceneCursor(u64);

impl SceneCursor {
    pub fn position(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no scenes configured")]
    Empty,

    #[error("unknown scene(s): {}", join(.missing))]
    UnknownScenes { missing: BTreeSet<SceneId> },
}

impl RegistryError {
    /// Configured scenes absent from the broadcast application.
    pub fn missing(&self) -> Option<&BTreeSet<SceneId>> {
        match self {
            RegistryError::UnknownScenes { missing } => Some(missing),
            RegistryError::Empty => None,
        }
    }
}

fn join(scenes: &BTreeSet<SceneId>) -> String {
    scenes.iter().map(SceneId::as_str).collect::<Vec<_>>().join(", ")
}

/// Rotation order whose every scene is known to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneRegistry {
    scenes: Vec<SceneId>,
}

impl SceneRegistry {
    /// Accepts `configured` only if every entry is in `available`.
    ///
    /// The whole list is rejected when any scene is missing, and the error
    /// names exactly the missing ones.
    pub fn validate(
        configured: &[SceneId],
        available: &BTreeSet<SceneId>,
    ) -> std::result::Result<Self, RegistryError> {
        if configured.is_empty() {
            return Err(RegistryError::Empty);
        }
        let missing = missing_scenes(configured, available);
        if !missing.is_empty() {
            return Err(RegistryError::UnknownScenes { missing });
        }
        Ok(Self {
            scenes: configured.to_vec(),
        })
    }

    /// Returns the scene at `cursor` and the advanced cursor.
    pub fn next_scene(&self, cursor: SceneCursor) -> (&SceneId, SceneCursor) {
        let index = (cursor.0 % self.scenes.len() as u64) as usize;
        (&self.scenes[index], SceneCursor(cursor.0 + 1))
    }

    pub fn scenes(&self) -> &[SceneId] {
        &self.scenes
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

/// Entries of `required` that are not in `available`.
pub fn missing_scenes<'a>(
    required: impl IntoIterator<Item = &'a SceneId>,
    available: &BTreeSet<SceneId>,
) -> BTreeSet<SceneId> {
    required.into_iter().filter(|scene| !available.contains(*scene)).cloned().collect()
}

pub async fn list_available_scenes(client: &ObsClient) -> Result<BTreeSet<SceneId>> {
    let list: SceneList = client.request(request::GET_SCENE_LIST, None).await?;
    let scenes: BTreeSet<SceneId> =
        list.scenes.into_iter().map(|s| SceneId(s.scene_name)).collect();
    debug!(target: "autocast.registry", count = scenes.len(), "listed scenes");
    Ok(scenes)
}

pub async fn current_scene(client: &ObsClient) -> Result<SceneId> {
    let current: CurrentProgramScene =
        client.request(request::GET_CURRENT_PROGRAM_SCENE, None).await?;
    Ok(SceneId(current.current_program_scene_name))
}

/// Makes `scene` the live program scene.
pub async fn apply_scene(client: &ObsClient, scene: &SceneId) -> Result<()> {
    let target = SceneTarget {
        scene_name: scene.0.clone(),
    };
    client
        .send_command(request::SET_CURRENT_PROGRAM_SCENE, Some(serde_json::to_value(target)?))
        .await?;
    Ok(())
}

pub async fn inspect_scene_items(client: &ObsClient, scene: &SceneId) -> Result<Vec<SceneItem>> {
    let target = SceneTarget {
        scene_name: scene.0.clone(),
    };
    let items: SceneItemList = client
        .request(request::GET_SCENE_ITEM_LIST, Some(serde_json::to_value(target)?))
        .await?;
    Ok(items.scene_items)
}

/// Source summary of one scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCheck {
    pub scene: SceneId,
    pub items: usize,
    pub enabled: usize,
}

impl SourceCheck {
    pub fn is_blank(&self) -> bool {
        self.enabled == 0
    }
}

/// Advisory preflight: warns about scenes that would show nothing.
///
/// Scenes whose items cannot be listed are skipped with a warning.
pub async fn verify_sources(client: &ObsClient, registry: &SceneRegistry) -> Vec<SourceCheck> {
    let mut checks = Vec::with_capacity(registry.len());
    let mut seen = BTreeSet::new();
    for scene in registry.scenes() {
        if !seen.insert(scene) {
            continue;
        }
        match inspect_scene_items(client, scene).await {
            Ok(items) => {
                let check = SourceCheck {
                    scene: scene.clone(),
                    items: items.len(),
                    enabled: items.iter().filter(|item| item.scene_item_enabled).count(),
                };
                if check.items == 0 {
                    warn!(target: "autocast.registry", scene = %scene, "scene has no sources");
                } else if check.is_blank() {
                    warn!(
                        target: "autocast.registry",
                        scene = %scene,
                        items = check.items,
                        "scene has no enabled sources"
                    );
                } else {
                    info!(
                        target: "autocast.registry",
                        scene = %scene,
                        items = check.items,
                        enabled = check.enabled,
                        "scene sources ok"
                    );
                }
                checks.push(check);
            }
            Err(e) => warn!(
                target: "autocast.registry",
                scene = %scene,
                error = %e,
                "could not list scene sources"
            ),
        }
    }
    checks
}
