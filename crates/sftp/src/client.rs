//! SSH connection setup for SFTP sessions.

use std::sync::Arc;
use std::time::Duration;

use russh::client;
use russh::keys::PublicKey;
use russh_sftp::client::SftpSession;

/// Connection parameters for the SFTP server.
#[derive(Debug, Clone)]
pub struct SftpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Ceiling for TCP connect plus SSH handshake.
    pub connect_timeout: Duration,
    pub keepalive: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum SshError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("SFTP subsystem unavailable: {0}")]
    Subsystem(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("SSH protocol error: {0}")]
    Protocol(String),
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::Protocol(err.to_string())
    }
}

/// Handler for russh callbacks. Host keys are accepted and logged; the
/// server is configured by the operator, not chosen by clients.
pub struct ClientHandler {
    host: String,
    port: u16,
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!(
            host = %self.host,
            port = self.port,
            algorithm = %server_public_key.algorithm(),
            "Accepting SFTP server host key"
        );
        Ok(true)
    }
}

/// An authenticated SSH connection with an SFTP channel on top.
///
/// The SSH handle is kept alongside the SFTP session: dropping it tears the
/// connection down.
pub struct SftpConnection {
    pub(crate) sftp: SftpSession,
    pub(crate) _handle: client::Handle<ClientHandler>,
}

/// Open a new SSH connection, authenticate with a password and start the
/// `sftp` subsystem.
pub async fn open_session(config: &SftpConfig) -> Result<SftpConnection, SshError> {
    let ssh_config = client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(config.keepalive),
        keepalive_max: 3,
        ..Default::default()
    };
    let handler = ClientHandler {
        host: config.host.clone(),
        port: config.port,
    };

    let addr = (config.host.as_str(), config.port);
    let mut handle = tokio::time::timeout(
        config.connect_timeout,
        client::connect(Arc::new(ssh_config), addr, handler),
    )
    .await
    .map_err(|_| SshError::Timeout(format!("connecting to {}:{}", config.host, config.port)))?
    .map_err(|e| SshError::ConnectionFailed(e.to_string()))?;

    let auth = handle
        .authenticate_password(&config.username, &config.password)
        .await
        .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?;
    if !auth.success() {
        return Err(SshError::AuthenticationFailed(
            "Authentication rejected by server".to_string(),
        ));
    }

    let channel = handle.channel_open_session().await?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(|e| SshError::Subsystem(e.to_string()))?;
    let sftp = SftpSession::new(channel.into_stream())
        .await
        .map_err(|e| SshError::Subsystem(e.to_string()))?;

    tracing::debug!(host = %config.host, user = %config.username, "SFTP session opened");
    Ok(SftpConnection {
        sftp,
        _handle: handle,
    })
}
