//! Google Drive recovery backend
//!
//! Stores the hex key as a file inside a dedicated folder of the user's
//! Drive, using the Drive v3 REST API. Obtaining the OAuth access token
//! (consent screen, client id) is the host application's job: it hands the
//! token over with `set_access_token`, or exports it in the environment
//! variable named by `access_token_env`.

use super::RecoveryMechanism;
use crate::wallet::WalletKey;
use crate::{Error, RemoteError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{watch, RwLock};
use url::Url;

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// What to do with an already stored key when multiple keys are not allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExistingKeyPolicy {
    #[default]
    Overwrite,
    /// Leave the stored key alone and fail the backup
    Keep,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleDriveOptions {
    pub folder_name: String,
    pub file_name: String,
    /// Keep every backed-up key instead of replacing the last one
    pub allow_multi_keys: bool,
    pub handle_existing_key: ExistingKeyPolicy,
    pub api_base: String,
    /// Environment variable read for an initial access token
    pub access_token_env: String,
}

impl Default for GoogleDriveOptions {
    fn default() -> Self {
        Self {
            folder_name: ".zero-wallet".to_string(),
            file_name: "key".to_string(),
            allow_multi_keys: true,
            handle_existing_key: ExistingKeyPolicy::Overwrite,
            api_base: "https://www.googleapis.com/".to_string(),
            access_token_env: "GOOGLE_DRIVE_ACCESS_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, PartialEq)]
enum BackupPlan {
    CreateNew,
    Overwrite(String),
    Refuse,
}

/// Failed Drive call
#[derive(Debug)]
struct DriveError {
    status: Option<StatusCode>,
    message: String,
}

impl DriveError {
    fn is_denied(&self) -> bool {
        matches!(
            self.status,
            Some(StatusCode::UNAUTHORIZED) | Some(StatusCode::FORBIDDEN)
        )
    }

    fn into_remote(self) -> RemoteError {
        let remote = RemoteError::new(self.message);
        match self.status {
            Some(status) => remote.with_status(status.as_u16()),
            None => remote,
        }
    }
}

impl std::fmt::Display for DriveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "Google Drive returned {}: {}", status, self.message),
            None => write!(f, "Google Drive request failed: {}", self.message),
        }
    }
}

pub struct GoogleDriveRecovery {
    options: GoogleDriveOptions,
    client: Client,
    api_base: Url,
    access_token: RwLock<Option<SecretString>>,
    ready: watch::Sender<bool>,
}

impl GoogleDriveRecovery {
    pub fn from_options(options: GoogleDriveOptions) -> Result<Self> {
        let api_base = Url::parse(&options.api_base).map_err(|e| {
            Error::Configuration(format!("Invalid Google Drive API base URL: {}", e))
        })?;

        let initial_token = std::env::var(&options.access_token_env)
            .ok()
            .filter(|token| !token.is_empty())
            .map(SecretString::from);
        let (ready, _) = watch::channel(initial_token.is_some());

        Ok(Self {
            options,
            client: Client::new(),
            api_base,
            access_token: RwLock::new(initial_token),
            ready,
        })
    }

    /// Provide the OAuth access token obtained by the host
    pub async fn set_access_token(&self, token: SecretString) {
        *self.access_token.write().await = Some(token);
        self.ready.send_replace(true);
    }

    pub async fn clear_access_token(&self) {
        *self.access_token.write().await = None;
        self.ready.send_replace(false);
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, DriveError> {
        self.api_base.join(path).map_err(|e| DriveError {
            status: None,
            message: format!("Invalid Drive URL: {}", e),
        })
    }

    async fn send(&self, request: RequestBuilder) -> std::result::Result<reqwest::Response, DriveError> {
        let token = self.access_token.read().await;
        let token = token.as_ref().ok_or_else(|| DriveError {
            status: Some(StatusCode::UNAUTHORIZED),
            message: "no Google access token available".to_string(),
        })?;

        let response = request
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| DriveError {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(DriveError {
                status: Some(status),
                message,
            })
        }
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<T, DriveError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| DriveError {
                status: None,
                message: format!("Malformed Drive response: {}", e),
            })
    }

    async fn find_folder(&self) -> std::result::Result<Option<String>, DriveError> {
        let url = self.endpoint("drive/v3/files")?;
        let list: FileList = self
            .send_json(self.client.get(url).query(&[
                ("q", folder_query(&self.options.folder_name)),
                ("fields", "files(id)".to_string()),
                ("spaces", "drive".to_string()),
            ]))
            .await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn ensure_folder(&self) -> std::result::Result<String, DriveError> {
        if let Some(id) = self.find_folder().await? {
            return Ok(id);
        }

        tracing::debug!(folder = %self.options.folder_name, "Creating Drive recovery folder");
        let url = self.endpoint("drive/v3/files")?;
        let folder: DriveFile = self
            .send_json(self.client.post(url).json(&json!({
                "name": self.options.folder_name,
                "mimeType": FOLDER_MIME_TYPE,
            })))
            .await?;
        Ok(folder.id)
    }

    async fn list_keys(&self, folder_id: &str) -> std::result::Result<Vec<DriveFile>, DriveError> {
        let url = self.endpoint("drive/v3/files")?;
        let list: FileList = self
            .send_json(self.client.get(url).query(&[
                ("q", key_query(folder_id, &self.options.file_name)),
                ("orderBy", "createdTime".to_string()),
                ("fields", "files(id)".to_string()),
                ("spaces", "drive".to_string()),
            ]))
            .await?;
        Ok(list.files)
    }

    async fn create_key_file(&self, folder_id: &str) -> std::result::Result<String, DriveError> {
        let url = self.endpoint("drive/v3/files")?;
        let file: DriveFile = self
            .send_json(self.client.post(url).json(&json!({
                "name": self.options.file_name,
                "parents": [folder_id],
                "mimeType": "text/plain",
            })))
            .await?;
        Ok(file.id)
    }

    async fn write_content(&self, file_id: &str, content: &str) -> std::result::Result<(), DriveError> {
        let url = self.endpoint(&format!("upload/drive/v3/files/{}", file_id))?;
        self.send(
            self.client
                .patch(url)
                .query(&[("uploadType", "media")])
                .header(reqwest::header::CONTENT_TYPE, "text/plain")
                .body(content.to_string()),
        )
        .await?;
        Ok(())
    }

    async fn read_content(&self, file_id: &str) -> std::result::Result<SecretString, DriveError> {
        let url = self.endpoint(&format!("drive/v3/files/{}", file_id))?;
        let text = self
            .send(self.client.get(url).query(&[("alt", "media")]))
            .await?
            .text()
            .await
            .map_err(|e| DriveError {
                status: None,
                message: e.to_string(),
            })?;
        Ok(SecretString::from(text))
    }
}

#[async_trait]
impl RecoveryMechanism for GoogleDriveRecovery {
    fn is_recovery_ready(&self) -> bool {
        *self.ready.borrow()
    }

    async fn recovery_ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as `self`, so this only returns once ready
        let _ = rx.wait_for(|ready| *ready).await;
    }

    async fn setup_recovery(&self, key: &WalletKey) -> Result<()> {
        let failed = |e: DriveError| Error::RecoveryBackupFailed(e.to_string());

        let folder_id = self.ensure_folder().await.map_err(failed)?;
        let existing = self.list_keys(&folder_id).await.map_err(failed)?;

        let file_id = match plan_backup(
            &existing,
            self.options.allow_multi_keys,
            self.options.handle_existing_key,
        ) {
            BackupPlan::CreateNew => self.create_key_file(&folder_id).await.map_err(failed)?,
            BackupPlan::Overwrite(id) => id,
            BackupPlan::Refuse => {
                return Err(Error::RecoveryBackupFailed(
                    "a key is already backed up and overwriting is disabled".to_string(),
                ))
            }
        };

        self.write_content(&file_id, key.to_secret_hex().expose_secret())
            .await
            .map_err(failed)?;

        tracing::info!(address = %key.address(), "Wallet key backed up to Google Drive");
        Ok(())
    }

    async fn initiate_recovery(&self, key_id: Option<usize>) -> Result<WalletKey> {
        let classify = |e: DriveError| {
            if e.is_denied() {
                Error::RecoveryDenied(e.to_string())
            } else {
                Error::Remote(e.into_remote())
            }
        };

        let folder_id = self
            .find_folder()
            .await
            .map_err(classify)?
            .ok_or_else(|| {
                Error::RecoveryNotFound(format!(
                    "no '{}' folder in Google Drive",
                    self.options.folder_name
                ))
            })?;

        let keys = self.list_keys(&folder_id).await.map_err(classify)?;
        let file = select_key(&keys, key_id).ok_or_else(|| {
            Error::RecoveryNotFound(match key_id {
                Some(id) => format!("no backed-up key with index {} ({} stored)", id, keys.len()),
                None => "no backed-up key in Google Drive".to_string(),
            })
        })?;

        let secret = self.read_content(&file.id).await.map_err(classify)?;
        WalletKey::from_secret(&secret)
    }

    fn name(&self) -> &'static str {
        "google_drive"
    }
}

impl std::fmt::Debug for GoogleDriveRecovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleDriveRecovery")
            .field("options", &self.options)
            .field("ready", &*self.ready.borrow())
            .finish_non_exhaustive()
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn folder_query(folder_name: &str) -> String {
    format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        escape_literal(folder_name),
        FOLDER_MIME_TYPE
    )
}

fn key_query(folder_id: &str, file_name: &str) -> String {
    format!(
        "'{}' in parents and name = '{}' and trashed = false",
        escape_literal(folder_id),
        escape_literal(file_name)
    )
}

/// `existing` is ordered oldest first
fn plan_backup(existing: &[DriveFile], allow_multi_keys: bool, policy: ExistingKeyPolicy) -> BackupPlan {
    if allow_multi_keys {
        return BackupPlan::CreateNew;
    }
    match (existing.last(), policy) {
        (None, _) => BackupPlan::CreateNew,
        (Some(file), ExistingKeyPolicy::Overwrite) => BackupPlan::Overwrite(file.id.clone()),
        (Some(_), ExistingKeyPolicy::Keep) => BackupPlan::Refuse,
    }
}

fn select_key(files: &[DriveFile], key_id: Option<usize>) -> Option<&DriveFile> {
    match key_id {
        Some(index) => files.get(index),
        None => files.last(),
    }
}
