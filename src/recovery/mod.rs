//! Key recovery
//!
//! A recovery mechanism backs a freshly created key up to an external medium
//! and can later hand the key back when no local copy exists. The signer and
//! connector only talk to the `RecoveryMechanism` trait; backends are a
//! closed set selected by `RecoveryConfig`.

mod google_drive;

use crate::wallet::WalletKey;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

pub use google_drive::{ExistingKeyPolicy, GoogleDriveOptions, GoogleDriveRecovery};

#[async_trait]
pub trait RecoveryMechanism: Send + Sync {
    /// Whether the backend can be used right now
    fn is_recovery_ready(&self) -> bool;

    /// Suspend until the backend becomes usable
    async fn recovery_ready(&self);

    /// Durably back up `key`; fails with `RecoveryBackupFailed`
    async fn setup_recovery(&self, key: &WalletKey) -> Result<()>;

    /// Retrieve a previously backed-up key
    ///
    /// `key_id` selects among several stored keys (oldest first); `None`
    /// picks the most recent one. Fails with `RecoveryNotFound` or
    /// `RecoveryDenied`.
    async fn initiate_recovery(&self, key_id: Option<usize>) -> Result<WalletKey>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

pub type SharedRecovery = Arc<dyn RecoveryMechanism>;

/// Recovery backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecoveryConfig {
    /// Keys are never backed up
    #[default]
    Disabled,
    GoogleDrive(GoogleDriveOptions),
}

impl RecoveryConfig {
    pub fn build(&self) -> Result<SharedRecovery> {
        match self {
            RecoveryConfig::Disabled => Ok(Arc::new(DisabledRecovery)),
            RecoveryConfig::GoogleDrive(options) => {
                Ok(Arc::new(GoogleDriveRecovery::from_options(options.clone())?))
            }
        }
    }
}

impl FromStr for RecoveryConfig {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "none" | "disabled" => Ok(RecoveryConfig::Disabled),
            "google" | "google_drive" => Ok(RecoveryConfig::GoogleDrive(GoogleDriveOptions::default())),
            other => Err(Error::Configuration(format!(
                "Unknown recovery mechanism: {}. Use 'google' or 'none'",
                other
            ))),
        }
    }
}

/// Backend used when no recovery medium is configured
///
/// Backups always fail so the caller can see the key is unprotected.
#[derive(Debug, Default)]
pub struct DisabledRecovery;

#[async_trait]
impl RecoveryMechanism for DisabledRecovery {
    fn is_recovery_ready(&self) -> bool {
        true
    }

    async fn recovery_ready(&self) {}

    async fn setup_recovery(&self, _key: &WalletKey) -> Result<()> {
        Err(Error::RecoveryBackupFailed(
            "no recovery mechanism configured".to_string(),
        ))
    }

    async fn initiate_recovery(&self, _key_id: Option<usize>) -> Result<WalletKey> {
        Err(Error::RecoveryNotFound(
            "no recovery mechanism configured".to_string(),
        ))
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}
