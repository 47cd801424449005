//! Connection check: everything a session would look at before streaming,
//! without starting the stream.

use std::collections::BTreeSet;

use autocast_protocol::{VersionInfo, request};
use autocast_runtime::{ClientOptions, Dialer, ObsClient};
use serde::Serialize;
use tracing::info;

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::registry::{self, RegistryError, SceneId, SceneRegistry, SourceCheck};
use crate::stream;

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub endpoint: String,
    pub obs_version: String,
    pub websocket_version: String,
    pub rpc_version: u32,
    pub auth_required: bool,
    pub current_scene: Option<SceneId>,
    pub available_scenes: BTreeSet<SceneId>,
    pub streaming: bool,
    /// Configured scenes the application does not have.
    pub missing_scenes: BTreeSet<SceneId>,
    pub sources: Vec<SourceCheck>,
}

impl ProbeReport {
    /// A session with this configuration would get past scene validation.
    pub fn is_ready(&self) -> bool {
        self.missing_scenes.is_empty()
    }

    pub fn registry_error(&self) -> Option<RegistryError> {
        (!self.is_ready()).then(|| RegistryError::UnknownScenes {
            missing: self.missing_scenes.clone(),
        })
    }
}

/// Connects, authenticates and inspects the application. Never streams.
///
/// Unknown scenes are reported in the result rather than as an error.
pub async fn probe(config: &SessionConfig, dialer: &dyn Dialer) -> Result<ProbeReport> {
    let endpoint = config.connection.endpoint_url();
    let options = ClientOptions::default().with_request_timeout(config.request_timeout);
    let mut client = ObsClient::connect(dialer, &endpoint, options)
        .await
        .map_err(|source| SessionError::Connection {
            endpoint: endpoint.clone(),
            source,
        })?;

    let result = inspect(&mut client, config, &endpoint).await;
    client.disconnect().await;
    result
}

async fn inspect(
    client: &mut ObsClient,
    config: &SessionConfig,
    endpoint: &str,
) -> Result<ProbeReport> {
    let auth_required = client.requires_auth();
    client
        .authenticate(config.connection.password.as_deref())
        .await
        .map_err(|source| SessionError::from_handshake(endpoint, source))?;

    let version: VersionInfo = client
        .request(request::GET_VERSION, None)
        .await
        .map_err(|source| SessionError::SceneQuery { source })?;
    let available = registry::list_available_scenes(client)
        .await
        .map_err(|source| SessionError::SceneQuery { source })?;
    let current_scene = registry::current_scene(client).await.ok();
    let streaming = stream::is_streaming(client)
        .await
        .map_err(|source| SessionError::SceneQuery { source })?;

    let required = config.scenes.iter().chain(config.initial_scene.iter());
    let missing_scenes = registry::missing_scenes(required, &available);
    let sources = match SceneRegistry::validate(&config.scenes, &available) {
        Ok(registry) if config.verify_sources => registry::verify_sources(client, &registry).await,
        _ => Vec::new(),
    };

    info!(
        target: "autocast.session",
        %endpoint,
        obs_version = %version.obs_version,
        scenes = available.len(),
        streaming,
        "probe complete"
    );

    Ok(ProbeReport {
        endpoint: endpoint.to_string(),
        obs_version: version.obs_version,
        websocket_version: version.obs_web_socket_version,
        rpc_version: version.rpc_version,
        auth_required,
        current_scene,
        available_scenes: available,
        streaming,
        missing_scenes,
        sources,
    })
}
