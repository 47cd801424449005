//! Numeric constants and request names defined by obs-websocket v5.

/// RPC version this client speaks.
pub const RPC_VERSION: u32 = 1;

/// Default control endpoint port of obs-websocket v5.
pub const DEFAULT_PORT: u16 = 4455;

/// `requestStatus.code` values the session logic inspects.
pub mod status {
    pub const SUCCESS: u16 = 100;
    pub const MISSING_REQUEST_TYPE: u16 = 203;
    pub const UNKNOWN_REQUEST_TYPE: u16 = 204;
    pub const MISSING_REQUEST_FIELD: u16 = 300;
    pub const OUTPUT_RUNNING: u16 = 500;
    pub const OUTPUT_NOT_RUNNING: u16 = 501;
    pub const RESOURCE_NOT_FOUND: u16 = 600;
    pub const REQUEST_PROCESSING_FAILED: u16 = 702;
}

/// WebSocket close codes sent by the server.
pub mod close {
    /// WebSocket level: the socket went away without a close frame.
    pub const ABNORMAL: u16 = 1006;
    pub const UNKNOWN_REASON: u16 = 4000;
    pub const MESSAGE_DECODE_ERROR: u16 = 4002;
    pub const NOT_IDENTIFIED: u16 = 4007;
    pub const ALREADY_IDENTIFIED: u16 = 4008;
    pub const AUTHENTICATION_FAILED: u16 = 4009;
    pub const UNSUPPORTED_RPC_VERSION: u16 = 4010;
    pub const SESSION_INVALIDATED: u16 = 4011;
}

/// Event subscription bit flags for `Identify.eventSubscriptions`.
pub mod subscription {
    pub const NONE: u32 = 0;
    pub const GENERAL: u32 = 1 << 0;
    pub const CONFIG: u32 = 1 << 1;
    pub const SCENES: u32 = 1 << 2;
    pub const INPUTS: u32 = 1 << 3;
    pub const TRANSITIONS: u32 = 1 << 4;
    pub const FILTERS: u32 = 1 << 5;
    pub const OUTPUTS: u32 = 1 << 6;
    pub const SCENE_ITEMS: u32 = 1 << 7;
    pub const MEDIA_INPUTS: u32 = 1 << 8;
    pub const VENDORS: u32 = 1 << 9;
    pub const UI: u32 = 1 << 10;
}

/// Request type names.
pub mod request {
    pub const GET_VERSION: &str = "GetVersion";
    pub const GET_SCENE_LIST: &str = "GetSceneList";
    pub const GET_CURRENT_PROGRAM_SCENE: &str = "GetCurrentProgramScene";
    pub const SET_CURRENT_PROGRAM_SCENE: &str = "SetCurrentProgramScene";
    pub const GET_SCENE_ITEM_LIST: &str = "GetSceneItemList";
    pub const START_STREAM: &str = "StartStream";
    pub const STOP_STREAM: &str = "StopStream";
    pub const GET_STREAM_STATUS: &str = "GetStreamStatus";
    pub const SET_INPUT_SETTINGS: &str = "SetInputSettings";
}

/// Event type names.
pub mod event {
    pub const STREAM_STATE_CHANGED: &str = "StreamStateChanged";
    pub const CURRENT_PROGRAM_SCENE_CHANGED: &str = "CurrentProgramSceneChanged";
    pub const EXIT_STARTED: &str = "ExitStarted";
}

/// `outputState` values carried by output state events.
pub mod output_state {
    pub const STARTING: &str = "OBS_WEBSOCKET_OUTPUT_STARTING";
    pub const STARTED: &str = "OBS_WEBSOCKET_OUTPUT_STARTED";
    pub const STOPPING: &str = "OBS_WEBSOCKET_OUTPUT_STOPPING";
    pub const STOPPED: &str = "OBS_WEBSOCKET_OUTPUT_STOPPED";
}
