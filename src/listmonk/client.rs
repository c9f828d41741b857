//! HTTP client for the Listmonk admin login and subscriber import endpoints

use crate::config::TargetConfig;
use crate::error::{SyncError, SyncResult};
use crate::listmonk::{parse_import_response, ImportResult, ImportUpload, Session, SubscriberTarget};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::multipart::{Form, Part};
use reqwest::{redirect, Client};

/// File name the batch is uploaded under
const UPLOAD_FILE_NAME: &str = "subscribers.csv";

/// Listmonk API client. One instance per run.
pub struct ListmonkClient {
    client: Client,
    config: TargetConfig,
}

impl ListmonkClient {
    /// Create a new client from the target configuration
    pub fn new(config: &TargetConfig) -> SyncResult<Self> {
        // Redirects stay visible so the login response's Set-Cookie can be read
        let client = Client::builder()
            .timeout(config.timeout())
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| {
                SyncError::connection_error(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }
}

#[async_trait]
impl SubscriberTarget for ListmonkClient {
    async fn authenticate(&self) -> SyncResult<Session> {
        let url = self.url("/admin/login");
        info!("Authenticating with Listmonk at {}", self.config.base_url());

        let response = self
            .client
            .post(&url)
            .form(&[
                ("username", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SyncError::connection_error(format!("login request failed: {}", e)))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(SyncError::connection_error(format!(
                "login endpoint returned status {}",
                status
            )));
        }
        if status.is_client_error() {
            return Err(SyncError::authentication_error(format!(
                "login rejected with status {}",
                status
            )));
        }

        let cookie_name = self.config.session_cookie.as_str();
        let session = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|header| cookie_value(header, cookie_name))
            .map(|value| Session::new(cookie_name, value));

        match session {
            Some(session) => {
                info!("Authenticated with Listmonk");
                Ok(session)
            }
            None => Err(SyncError::authentication_error(format!(
                "login returned status {} without a '{}' cookie",
                status, cookie_name
            ))),
        }
    }

    async fn import_subscribers(
        &self,
        session: &Session,
        upload: ImportUpload,
    ) -> SyncResult<ImportResult> {
        let url = self.url("/api/import/subscribers");
        let params = serde_json::to_string(&upload.params)?;
        debug!("Import params: {}", params);

        let file = Part::bytes(upload.file)
            .file_name(UPLOAD_FILE_NAME)
            .mime_str("text/csv")?;
        let form = Form::new().text("params", params).part("file", file);

        info!(
            "Uploading {} subscribers to list {:?}",
            upload.rows, upload.params.lists
        );
        let response = self
            .client
            .post(&url)
            .header(COOKIE, session.cookie_header())
            .multipart(form)
            .send()
            .await
            .map_err(|e| SyncError::connection_error(format!("import request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            SyncError::connection_error(format!("reading import response failed: {}", e))
        })?;
        debug!("Import response ({}): {}", status, body);

        Ok(parse_import_response(status.as_u16(), &body, upload.rows))
    }
}

/// Value of cookie `name` in a `Set-Cookie` header, if present and non-empty
fn cookie_value<'a>(set_cookie: &'a str, name: &str) -> Option<&'a str> {
    let pair = set_cookie.split(';').next()?;
    let (key, value) = pair.split_once('=')?;
    let value = value.trim();
    (key.trim() == name && !value.is_empty()).then_some(value)
}
