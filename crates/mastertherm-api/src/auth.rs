// Authenticated session against the MasterTherm cloud servlets.
//
// `Auth` owns the HTTP client, the credentials and the module map returned
// at login. Data and write requests transparently log in again when the
// token has aged out or the servlet reports it invalid. Concurrent requests
// share one relogin.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use sha1::{Digest, Sha1};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::models::{
    build_module_map, DeviceData, LoginResponse, ModuleMap, ServletResponse,
    ERROR_ID_TOKEN_INVALID, VARFILE,
};
use crate::transport::TransportConfig;

/// Public MasterTherm cloud endpoint.
pub const DEFAULT_BASE_URL: &str = "https://mastertherm.vip-it.at";

/// Roles allowed to read and write heat-pump registers.
pub const SUPPORTED_ROLES: &[&str] = &["400"];

/// How long a login is trusted before the next request logs in again.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(60 * 60);

const LOGIN_PATH: &str = "plugin/mt/servlet/login";
const DATA_PATH: &str = "mt/PassiveVisServlet";
const WRITE_PATH: &str = "mt/ActiveVisServlet";

#[derive(Debug, Default)]
struct SessionState {
    connected_at: Option<Instant>,
    /// Bumped on every successful login
    generation: u64,
    closed: bool,
    role: Option<String>,
    modules: ModuleMap,
}

impl SessionState {
    fn is_expired(&self, lifetime: Duration) -> bool {
        self.connected_at
            .map_or(true, |at| at.elapsed() >= lifetime)
    }
}

/// Authenticated MasterTherm session.
///
/// One instance per account. Share it behind an `Arc` between the
/// [`Thermostat`](crate::Thermostat)s built from its module map.
#[derive(Debug)]
pub struct Auth {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: SecretString,
    token_lifetime: Duration,
    state: RwLock<SessionState>,
    login_lock: Mutex<()>,
    message_id: AtomicU64,
}

impl Auth {
    /// Create a session for the public cloud endpoint.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        transport: &TransportConfig,
    ) -> Result<Self> {
        Self::with_base_url(username, password, DEFAULT_BASE_URL, transport)
    }

    /// Create a session against a specific endpoint.
    pub fn with_base_url(
        username: impl Into<String>,
        password: impl Into<String>,
        base_url: &str,
        transport: &TransportConfig,
    ) -> Result<Self> {
        let http = transport.build_client()?;
        Self::with_client(username, password, base_url, http)
    }

    /// Create a session with a pre-built `reqwest::Client`.
    ///
    /// The client must carry a cookie store; the servlet session lives in it.
    pub fn with_client(
        username: impl Into<String>,
        password: impl Into<String>,
        base_url: &str,
        http: reqwest::Client,
    ) -> Result<Self> {
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
        Ok(Self {
            http,
            base_url,
            username: username.into(),
            password: SecretString::from(password.into()),
            token_lifetime: TOKEN_LIFETIME,
            state: RwLock::new(SessionState::default()),
            login_lock: Mutex::new(()),
            message_id: AtomicU64::new(0),
        })
    }

    /// Override how long a login is trusted.
    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Role reported by the last successful login.
    pub fn role(&self) -> Option<String> {
        self.read_state().role.clone()
    }

    /// Whether a login succeeded and the session has not been closed.
    pub fn is_connected(&self) -> bool {
        let state = self.read_state();
        state.connected_at.is_some() && !state.closed
    }

    /// Modules and devices discovered at the last login.
    pub fn modules(&self) -> ModuleMap {
        self.read_state().modules.clone()
    }

    /// Log in and refresh the module map.
    pub async fn connect(&self) -> Result<()> {
        let password_hash = hash_password(self.password.expose_secret());
        let form = [
            ("login", "login"),
            ("uname", self.username.as_str()),
            ("upwd", password_hash.as_str()),
            ("language", "en"),
        ];

        let body = match self.post_form(LOGIN_PATH, &form).await {
            Err(Error::TokenInvalid) => {
                return Err(Error::Authentication {
                    message: "credentials rejected".into(),
                })
            }
            other => other?,
        };
        let login: LoginResponse = parse_json(&body)?;

        if login.returncode != "0" {
            return Err(Error::Authentication {
                message: login
                    .message
                    .unwrap_or_else(|| format!("returncode={}", login.returncode)),
            });
        }

        let role = login.role.unwrap_or_default();
        if !SUPPORTED_ROLES.contains(&role.as_str()) {
            return Err(Error::UnsupportedRole { role });
        }

        let modules = build_module_map(&login.modules);
        info!(
            "Connected to MasterTherm as {} ({} modules)",
            self.username,
            modules.len()
        );

        let mut state = self.write_state();
        state.connected_at = Some(Instant::now());
        state.generation += 1;
        state.closed = false;
        state.role = Some(role);
        state.modules = modules;
        Ok(())
    }

    /// Drop the session token and module map.
    ///
    /// Requests fail with [`Error::TokenInvalid`] until `connect` is called
    /// again.
    pub fn close(&self) {
        let mut state = self.write_state();
        *state = SessionState {
            generation: state.generation,
            closed: true,
            ..SessionState::default()
        };
        debug!("Closed MasterTherm session for {}", self.username);
    }

    /// Fetch the current registers of one device.
    pub async fn get_device_data(&self, module_id: &str, device_id: &str) -> Result<DeviceData> {
        let seen = self.ensure_session().await?;
        match self.request_data(module_id, device_id).await {
            Err(e) if e.is_auth_expired() => {
                warn!("MasterTherm token rejected, logging in again");
                self.relogin(seen).await?;
                self.request_data(module_id, device_id).await
            }
            other => other,
        }
    }

    /// Write one register of one device.
    pub async fn set_variable(
        &self,
        module_id: &str,
        device_id: &str,
        register: &str,
        value: &str,
    ) -> Result<()> {
        let seen = self.ensure_session().await?;
        match self.request_write(module_id, device_id, register, value).await {
            Err(e) if e.is_auth_expired() => {
                warn!("MasterTherm token rejected, logging in again");
                self.relogin(seen).await?;
                self.request_write(module_id, device_id, register, value)
                    .await
            }
            other => other,
        }
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Returns the login generation the following request runs under.
    async fn ensure_session(&self) -> Result<u64> {
        let (closed, expired, generation) = {
            let state = self.read_state();
            (
                state.closed,
                state.is_expired(self.token_lifetime),
                state.generation,
            )
        };

        if closed {
            return Err(Error::TokenInvalid);
        }
        if expired {
            debug!("MasterTherm token expired, logging in again");
            return self.relogin(generation).await;
        }
        Ok(generation)
    }

    /// Log in again unless another request already did so after `seen`.
    async fn relogin(&self, seen: u64) -> Result<u64> {
        let _guard = self.login_lock.lock().await;

        let current = self.read_state().generation;
        if current != seen {
            debug!("MasterTherm session already renewed");
            return Ok(current);
        }

        self.connect().await?;
        Ok(self.read_state().generation)
    }

    async fn request_data(&self, module_id: &str, device_id: &str) -> Result<DeviceData> {
        let message_id = self.next_message_id();
        let form = [
            ("moduleId", module_id),
            ("deviceId", device_id),
            ("messageId", message_id.as_str()),
            ("lastUpdateTime", "0"),
            ("errorResponse", "true"),
            ("fullRange", "true"),
        ];

        let body = self.post_form(DATA_PATH, &form).await?;
        let resp: ServletResponse = parse_json(&body)?;
        check_servlet_error(&resp, &body)?;

        let registers = resp
            .registers(device_id)
            .ok_or_else(|| Error::ResponseFormat {
                message: format!("no {VARFILE} data for device {module_id}/{device_id}"),
                body: body.clone(),
            })?;

        debug!(
            "Fetched {} registers for {}/{}",
            registers.len(),
            module_id,
            device_id
        );
        Ok(DeviceData::new(registers))
    }

    async fn request_write(
        &self,
        module_id: &str,
        device_id: &str,
        register: &str,
        value: &str,
    ) -> Result<()> {
        let message_id = self.next_message_id();
        let form = [
            ("moduleId", module_id),
            ("deviceId", device_id),
            ("configFile", VARFILE),
            ("messageId", message_id.as_str()),
            ("variableId", register),
            ("variableValue", value),
        ];

        let body = self.post_form(WRITE_PATH, &form).await?;
        let resp: ServletResponse = parse_json(&body)?;
        check_servlet_error(&resp, &body)?;

        debug!("Set {} = {} on {}/{}", register, value, module_id, device_id);
        Ok(())
    }

    /// POST a form and return the body of a successful reply.
    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<String> {
        let url = self.base_url.join(path)?;
        debug!("POST {}", url);

        let resp = self.http.post(url).form(form).send().await?;
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::TokenInvalid);
        }
        if !status.is_success() {
            return Err(Error::Connection {
                message: format!("HTTP {status}"),
            });
        }

        Ok(resp.text().await?)
    }

    fn next_message_id(&self) -> String {
        (self.message_id.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Lowercase hex SHA-1, the form the login servlet expects.
fn hash_password(password: &str) -> String {
    Sha1::digest(password.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| Error::ResponseFormat {
        message: e.to_string(),
        body: body.to_string(),
    })
}

fn check_servlet_error(resp: &ServletResponse, body: &str) -> Result<()> {
    match resp.error_id {
        0 => Ok(()),
        ERROR_ID_TOKEN_INVALID => Err(Error::TokenInvalid),
        id => Err(Error::ResponseFormat {
            message: format!(
                "servlet error {id}: {}",
                resp.error_message.as_deref().unwrap_or("no message")
            ),
            body: body.to_string(),
        }),
    }
}
