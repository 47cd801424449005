//! Typed `requestData`, `responseData` and `eventData` payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `GetVersion` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub obs_version: String,
    pub obs_web_socket_version: String,
    pub rpc_version: u32,
    #[serde(default)]
    pub available_requests: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_description: Option<String>,
}

/// One entry of `GetSceneList.scenes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneListEntry {
    pub scene_name: String,
    #[serde(default)]
    pub scene_index: i64,
}

/// `GetSceneList` response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneList {
    #[serde(default)]
    pub current_program_scene_name: Option<String>,
    #[serde(default)]
    pub current_preview_scene_name: Option<String>,
    #[serde(default)]
    pub scenes: Vec<SceneListEntry>,
}

/// `GetCurrentProgramScene` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentProgramScene {
    pub current_program_scene_name: String,
}

/// Request data naming a single scene (`SetCurrentProgramScene`, `GetSceneItemList`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneTarget {
    pub scene_name: String,
}

/// One entry of `GetSceneItemList.sceneItems`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneItem {
    #[serde(default)]
    pub scene_item_id: i64,
    pub source_name: String,
    #[serde(default = "default_enabled")]
    pub scene_item_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_kind: Option<String>,
}

fn default_enabled() -> bool {
    true
}

/// `GetSceneItemList` response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneItemList {
    #[serde(default)]
    pub scene_items: Vec<SceneItem>,
}

/// `GetStreamStatus` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamStatus {
    pub output_active: bool,
    pub output_reconnecting: bool,
    pub output_timecode: String,
    /// Milliseconds since the output started.
    pub output_duration: u64,
    /// 0.0 (idle) to 1.0 (saturated).
    pub output_congestion: f64,
    pub output_bytes: u64,
    pub output_skipped_frames: u64,
    pub output_total_frames: u64,
}

/// `SetInputSettings` request data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSettings {
    pub input_name: String,
    pub input_settings: Value,
    /// `true` merges into existing settings, `false` replaces them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<bool>,
}

/// `StreamStateChanged` event data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputStateChanged {
    pub output_active: bool,
    pub output_state: String,
}

/// `CurrentProgramSceneChanged` event data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramSceneChanged {
    pub scene_name: String,
}
