//! Blocking HTTP client for the CMA inventory API.
//!
//! - Blocking client using `ureq` (no async); `Sync`, so register lookups can fan out over threads.
//! - Bearer token from `POST /auth/token`, cached behind a mutex and refreshed once on 401.
//! - Transport errors and timeouts are retried with a jittered linear backoff.
//! - Paginated list endpoints are followed to the last page.

use http::StatusCode;
use log::{debug, warn};
use rand::Rng;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use thiserror::Error;

use crate::models::inventory::*;

const TOKEN_PATH: &str = "/auth/token";
const RETRY_BASE_DELAY_MS: u64 = 500;
/// Hard stop for runaway pagination when the server never reports the last page.
const MAX_PAGES: u32 = 10_000;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error after {attempts} attempt(s): {message}")]
    Transport { attempts: u32, message: String },
    #[error("http {status} from {url}: {message}")]
    Http { status: u16, url: String, message: String },
    #[error("decoding {url} failed at {path}: {message}")]
    Decode { url: String, path: String, message: String },
    #[error("auth error: {0}")]
    Auth(String),
    #[error("unauthorized after token refresh: {0}")]
    Unauthorized(String),
}

/// Connection settings for [`InventoryClient::connect`].
#[derive(Debug, Clone)]
pub struct InventorySettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
    pub max_attempts: NonZeroU32,
}

/// Optional filters of the sensor list endpoints.
#[derive(Debug, Clone, Default)]
pub struct SensorFilter {
    pub hardware_id: Option<HardwareId>,
    pub active: Option<bool>,
    pub manufacturer_id: Option<String>,
    pub name: Option<String>,
    pub model: Option<String>,
}

impl SensorFilter {
    pub fn for_hardware(hardware_id: &HardwareId) -> Self {
        SensorFilter {
            hardware_id: Some(hardware_id.clone()),
            ..Default::default()
        }
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut q = Vec::new();
        if let Some(h) = &self.hardware_id {
            q.push(("hardwareId", h.0.clone()));
        }
        if let Some(a) = self.active {
            q.push(("active", a.to_string()));
        }
        if let Some(m) = &self.manufacturer_id {
            q.push(("manufacturerId", m.clone()));
        }
        if let Some(n) = &self.name {
            q.push(("name", n.clone()));
        }
        if let Some(m) = &self.model {
            q.push(("model", m.clone()));
        }
        q
    }
}

pub struct InventoryClient {
    agent: ureq::Agent,
    base_url: String,
    username: String,
    password: String,
    max_attempts: NonZeroU32,
    token: Mutex<Option<String>>,
}

impl InventoryClient {
    /// Build the agent and log in once; a rejected login is fatal for the caller.
    pub fn connect(settings: InventorySettings) -> Result<Self, ClientError> {
        let agent = ureq::AgentBuilder::new().timeout(settings.timeout).build();
        let client = InventoryClient {
            agent,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            username: settings.username,
            password: settings.password,
            max_attempts: settings.max_attempts,
            token: Mutex::new(None),
        };
        client.refresh_token()?;
        Ok(client)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn backoff(attempt: u32) -> Duration {
        let jitter = rand::rng().random_range(0..=RETRY_BASE_DELAY_MS / 2);
        Duration::from_millis(RETRY_BASE_DELAY_MS * u64::from(attempt) + jitter)
    }

    fn request_token(&self) -> Result<String, ClientError> {
        #[derive(serde::Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let url = self.url(TOKEN_PATH);
        let mut attempt = 1;
        loop {
            let resp = self
                .agent
                .post(&url)
                .set("Accept", "application/json")
                .send_json(serde_json::json!({
                    "username": self.username,
                    "password": self.password,
                }));
            match resp {
                Ok(r) => {
                    let status = r.status();
                    if status != StatusCode::OK.as_u16() && status != StatusCode::CREATED.as_u16() {
                        return Err(ClientError::Auth(format!("unexpected status {} from {}", status, url)));
                    }
                    let TokenResponse { access_token } = decode(&url, r)?;
                    return Ok(access_token);
                }
                Err(ureq::Error::Transport(t)) if attempt < self.max_attempts.get() => {
                    warn!("Token request attempt {} failed: {}; retrying", attempt, t);
                    thread::sleep(Self::backoff(attempt));
                    attempt += 1;
                }
                Err(ureq::Error::Transport(t)) => {
                    return Err(ClientError::Transport {
                        attempts: attempt,
                        message: t.to_string(),
                    });
                }
                Err(ureq::Error::Status(status, resp)) => {
                    let body = resp.into_string().unwrap_or_else(|_| String::from("<no body>"));
                    return Err(ClientError::Auth(format!("http {}: {}", status, body)));
                }
            }
        }
    }

    fn refresh_token(&self) -> Result<String, ClientError> {
        let token = self.request_token()?;
        debug!("Inventory bearer token refreshed");
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(token)
    }

    fn bearer(&self) -> Result<String, ClientError> {
        let cached = self.token.lock().unwrap_or_else(PoisonError::into_inner).clone();
        match cached {
            Some(t) => Ok(t),
            None => self.refresh_token(),
        }
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ClientError> {
        let url = self.url(path);
        let mut refreshed = false;
        let mut attempt = 1;
        loop {
            let token = self.bearer()?;
            let mut req = self
                .agent
                .get(&url)
                .set("Accept", "application/json")
                .set("Authorization", &format!("Bearer {}", token));
            for (k, v) in query {
                req = req.query(k, v);
            }

            match req.call() {
                Ok(res) => return decode(&url, res),
                Err(ureq::Error::Status(401, res)) => {
                    if refreshed {
                        let body = res.into_string().unwrap_or_else(|_| String::from("<no body>"));
                        return Err(ClientError::Unauthorized(format!("{}: {}", url, body)));
                    }
                    // token expired: log in again and retry once
                    debug!("401 from {}; refreshing token", url);
                    self.refresh_token()?;
                    refreshed = true;
                }
                Err(ureq::Error::Status(status, res)) => {
                    let body = res.into_string().unwrap_or_else(|_| String::from("<no body>"));
                    return Err(ClientError::Http {
                        status,
                        url,
                        message: body,
                    });
                }
                Err(ureq::Error::Transport(t)) if attempt < self.max_attempts.get() => {
                    warn!("GET {} attempt {}/{} failed: {}; retrying", url, attempt, self.max_attempts, t);
                    thread::sleep(Self::backoff(attempt));
                    attempt += 1;
                }
                Err(ureq::Error::Transport(t)) => {
                    return Err(ClientError::Transport {
                        attempts: attempt,
                        message: t.to_string(),
                    });
                }
            }
        }
    }

    /// Follow a paginated list endpoint to its last page.
    fn get_all_pages<T: DeserializeOwned>(
        &self,
        path: &str,
        filters: &[(&str, String)],
        page_size: NonZeroU32,
    ) -> Result<Vec<T>, ClientError> {
        let mut items = Vec::new();
        for page in 0..MAX_PAGES {
            let mut query = filters.to_vec();
            query.push(("page", page.to_string()));
            query.push(("size", page_size.to_string()));
            let resp: Page<T> = self.get_json(path, &query)?;
            let fetched = resp.content.len();
            items.extend(resp.content);
            if is_last_page(page, fetched, page_size.get(), resp.last, resp.total_pages) {
                return Ok(items);
            }
        }
        warn!("{} still had pages after {} requests; stopping", path, MAX_PAGES);
        Ok(items)
    }

    pub fn list_gateways(&self) -> Result<Vec<Gateway>, ClientError> {
        self.get_json("/cma-gateways/all", &[])
    }

    pub fn get_gateway(&self, id: &GatewayId) -> Result<Gateway, ClientError> {
        self.get_json(&format!("/cma-gateways/{}", id), &[])
    }

    pub fn list_hardware(&self, gateway_id: &GatewayId) -> Result<Vec<Hardware>, ClientError> {
        self.get_json("/hardwares/all", &[("cmaGatewayId", gateway_id.0.clone())])
    }

    pub fn get_hardware(&self, id: &HardwareId) -> Result<Hardware, ClientError> {
        self.get_json(&format!("/hardwares/{}", id), &[])
    }

    pub fn list_sensors(
        &self,
        protocol: Protocol,
        filter: &SensorFilter,
        page_size: NonZeroU32,
    ) -> Result<Vec<ListItem>, ClientError> {
        self.get_all_pages(protocol.sensors_path(), &filter.query(), page_size)
    }

    pub fn get_sensor_modbus(&self, id: &SensorId) -> Result<SensorModbus, ClientError> {
        self.get_json(&format!("{}/{}", Protocol::Modbus.sensors_path(), id), &[])
    }

    pub fn get_sensor_dnp(&self, id: &SensorId) -> Result<SensorDnp, ClientError> {
        self.get_json(&format!("{}/{}", Protocol::Dnp3.sensors_path(), id), &[])
    }

    pub fn list_registers(
        &self,
        protocol: Protocol,
        sensor_id: &SensorId,
        page_size: NonZeroU32,
    ) -> Result<Vec<ListItem>, ClientError> {
        let filters = [(protocol.register_parent_param(), sensor_id.0.clone())];
        self.get_all_pages(protocol.registers_path(), &filters, page_size)
    }

    pub fn get_register_modbus(&self, id: &RegisterId) -> Result<RegisterModbus, ClientError> {
        self.get_json(&format!("{}/{}", Protocol::Modbus.registers_path(), id), &[])
    }

    pub fn get_register_dnp(&self, id: &RegisterId) -> Result<RegisterDnp, ClientError> {
        self.get_json(&format!("{}/{}", Protocol::Dnp3.registers_path(), id), &[])
    }
}

fn decode<T: DeserializeOwned>(url: &str, res: ureq::Response) -> Result<T, ClientError> {
    let reader = res.into_reader();
    let mut de = serde_json::Deserializer::from_reader(reader);
    serde_path_to_error::deserialize(&mut de).map_err(|e| ClientError::Decode {
        url: url.to_string(),
        path: e.path().to_string(),
        message: e.inner().to_string(),
    })
}

fn is_last_page(page: u32, fetched: usize, page_size: u32, last: Option<bool>, total_pages: Option<u32>) -> bool {
    if let Some(last) = last {
        return last;
    }
    if let Some(total) = total_pages {
        return page + 1 >= total;
    }
    fetched < page_size as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_page_prefers_server_flags() {
        assert!(is_last_page(0, 100, 100, Some(true), None));
        assert!(!is_last_page(0, 3, 100, Some(false), None));
        assert!(is_last_page(4, 100, 100, None, Some(5)));
        assert!(!is_last_page(3, 100, 100, None, Some(5)));
    }

    #[test]
    fn last_page_falls_back_to_short_page() {
        assert!(is_last_page(0, 7, 100, None, None));
        assert!(!is_last_page(0, 100, 100, None, None));
        assert!(is_last_page(2, 0, 100, None, None));
    }

    #[test]
    fn sensor_filter_builds_only_set_params() {
        let filter = SensorFilter {
            hardware_id: Some(HardwareId("h1".into())),
            active: Some(true),
            ..Default::default()
        };
        assert_eq!(
            filter.query(),
            vec![("hardwareId", "h1".to_string()), ("active", "true".to_string())]
        );
        assert!(SensorFilter::default().query().is_empty());
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let first = InventoryClient::backoff(1);
        let third = InventoryClient::backoff(3);
        assert!(first >= Duration::from_millis(RETRY_BASE_DELAY_MS));
        assert!(third >= Duration::from_millis(RETRY_BASE_DELAY_MS * 3));
        assert!(first <= Duration::from_millis(RETRY_BASE_DELAY_MS + RETRY_BASE_DELAY_MS / 2));
    }
}
