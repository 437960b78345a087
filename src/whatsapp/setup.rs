//! Bridge sidecar lifecycle and QR linking.
//!
//! Keeps the baileys bridge container running: inspect, start if stopped,
//! pull and create if missing.

use std::collections::HashMap;

use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, StartContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum};
use bollard::Docker;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use super::client::WhatsAppClient;
use super::WhatsAppError;
use crate::config::BridgeConfig;

/// Memory limit for the bridge sidecar (512 MB).
const MEMORY_LIMIT_BYTES: i64 = 512 * 1024 * 1024;

/// Label attached to containers created by the bot.
const OWNER_LABEL: &str = "tukang";

/// Port bindings publishing the bridge on loopback only.
fn port_bindings(port: u16) -> HashMap<String, Option<Vec<PortBinding>>> {
    let mut bindings = HashMap::new();
    bindings.insert(
        format!("{port}/tcp"),
        Some(vec![PortBinding {
            host_ip: Some("127.0.0.1".to_owned()),
            host_port: Some(port.to_string()),
        }]),
    );
    bindings
}

/// Ensure the bridge container is running.
pub async fn ensure_container(docker: &Docker, bridge: &BridgeConfig) -> Result<(), WhatsAppError> {
    let name = bridge.container_name.as_str();

    match docker.inspect_container(name, None).await {
        Ok(info) => {
            let running = info.state.as_ref().and_then(|s| s.running).unwrap_or(false);
            if running {
                info!(container = name, "WhatsApp bridge already running");
                return Ok(());
            }
            docker
                .start_container(name, None::<StartContainerOptions<String>>)
                .await
                .map_err(|e| {
                    WhatsAppError::SetupFailed(format!("failed to start container: {e}"))
                })?;
            info!(container = name, "WhatsApp bridge started");
            return Ok(());
        }
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => {}
        Err(e) => {
            return Err(WhatsAppError::SetupFailed(format!(
                "failed to inspect container: {e}"
            )));
        }
    }

    let pull_opts = CreateImageOptions {
        from_image: bridge.image.as_str(),
        ..Default::default()
    };
    let mut pull_stream = docker.create_image(Some(pull_opts), None, None);
    while let Some(result) = pull_stream.next().await {
        if let Err(e) = result {
            warn!(error = %e, "image pull warning");
        }
    }
    info!(image = %bridge.image, "WhatsApp bridge image pulled");

    // The bridge keeps a persistent WebSocket to WhatsApp, so it stays on the
    // default Docker network and is only published on 127.0.0.1.
    let host_config = HostConfig {
        port_bindings: Some(port_bindings(bridge.port)),
        restart_policy: Some(RestartPolicy {
            name: Some(RestartPolicyNameEnum::ON_FAILURE),
            maximum_retry_count: Some(5),
        }),
        memory: Some(MEMORY_LIMIT_BYTES),
        ..Default::default()
    };

    let mut labels = HashMap::new();
    labels.insert(OWNER_LABEL.to_owned(), "true".to_owned());

    let mut exposed_ports = HashMap::new();
    exposed_ports.insert(format!("{}/tcp", bridge.port), HashMap::new());

    let container_config = ContainerConfig {
        image: Some(bridge.image.clone()),
        labels: Some(labels),
        exposed_ports: Some(exposed_ports),
        env: Some(vec![format!("PORT={}", bridge.port)]),
        host_config: Some(host_config),
        ..Default::default()
    };

    let create_opts = CreateContainerOptions {
        name: name.to_owned(),
        platform: None,
    };
    docker
        .create_container(Some(create_opts), container_config)
        .await
        .map_err(|e| WhatsAppError::SetupFailed(format!("failed to create container: {e}")))?;

    docker
        .start_container(name, None::<StartContainerOptions<String>>)
        .await
        .map_err(|e| WhatsAppError::SetupFailed(format!("failed to start container: {e}")))?;

    info!(container = name, image = %bridge.image, "WhatsApp bridge created and started");
    Ok(())
}

/// Make the bridge reachable: start the container when managed, then wait
/// for the HTTP API to answer.
pub async fn prepare_bridge(bridge: &BridgeConfig) -> Result<WhatsAppClient, WhatsAppError> {
    if bridge.manage_container {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| WhatsAppError::SetupFailed(format!("docker unavailable: {e}")))?;
        ensure_container(&docker, bridge).await?;
    }

    let client = WhatsAppClient::new(bridge.url.clone());
    client.wait_healthy().await?;
    Ok(client)
}
