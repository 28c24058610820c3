//! REST implementation of [`CatalogClient`].
//!
//! Login goes through the v2 API; everything else through v3. Non-fatal
//! failures are logged here and surface to callers as `Ok(None)`.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use catalog_types::{
    CatalogPath, CatalogRef, Entity, JobHandle, JobResults, JobStatus, Lineage, Principal,
    PrincipalKind, Reflection, SqlRequest, Tags, Vote, Wiki, WlmQueue, WlmRule,
};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{CatalogClient, ClientError, Result};

const LOGIN: &str = "apiv2/login";
const CATALOG: &str = "api/v3/catalog";
const CATALOG_BY_PATH: &str = "api/v3/catalog/by-path";
const REFLECTION: &str = "api/v3/reflection";
const WLM_QUEUE: &str = "api/v3/wlm/queue";
const WLM_RULE: &str = "api/v3/wlm/rule";
const VOTE: &str = "api/v3/vote";
const SQL: &str = "api/v3/sql";
const JOB: &str = "api/v3/job";

const TOKEN_PREFIX: &str = "_dremio";
/// Ids of not-yet-promoted folders and files are paths behind this prefix.
const PATH_ID_PREFIX: &str = "dremio:";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Url,
    pub user: String,
    pub password: String,
    pub timeout: Duration,
    pub verify_ssl: bool,
    /// Never send writes; echo the payload back as if the server accepted it.
    pub dry_run: bool,
}

impl ClientConfig {
    pub fn new(endpoint: Url, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            endpoint,
            user: user.into(),
            password: password.into(),
            timeout: DEFAULT_TIMEOUT,
            verify_ssl: true,
            dry_run: false,
        }
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct DataEnvelope<T> {
    #[serde(default)]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct RuleSet {
    #[serde(default)]
    rules: Vec<WlmRule>,
}

pub struct RestCatalogClient {
    http: Client,
    config: ClientConfig,
    endpoint_label: String,
    token: Mutex<Option<String>>,
    timed_out_sources: Mutex<HashSet<String>>,
}

impl RestCatalogClient {
    /// Build the client without contacting the server.
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.endpoint.cannot_be_a_base() {
            return Err(ClientError::Configuration(format!(
                "{} is not a usable base URL",
                config.endpoint
            )));
        }
        if !config.verify_ssl {
            warn!("Unverified TLS certificates will be accepted as per configuration");
        }
        let http = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| ClientError::Configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint_label: config.endpoint.to_string(),
            config,
            token: Mutex::new(None),
            timed_out_sources: Mutex::new(HashSet::new()),
        })
    }

    /// Build the client and log in.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let client = Self::new(config)?;
        client.authenticate().await?;
        Ok(client)
    }

    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    pub async fn authenticate(&self) -> Result<()> {
        let url = self.url(LOGIN, std::iter::empty::<&str>())?;
        debug!(url = %url, user = %self.config.user, "authenticating");
        let response = self
            .http
            .post(url)
            .json(&json!({ "userName": self.config.user, "password": self.config.password }))
            .send()
            .await
            .map_err(|e| ClientError::Authentication(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ClientError::Authentication(format!("HTTP {status}")));
        }
        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Authentication(format!("malformed login response: {e}")))?;
        *lock(&self.token) = Some(format!("{TOKEN_PREFIX}{}", login.token));
        Ok(())
    }

    fn is_latched(&self, source: &str) -> bool {
        lock(&self.timed_out_sources).contains(source)
    }

    fn url<I, S>(&self, route: &str, segments: I) -> Result<Url>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut url = self.config.endpoint.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                ClientError::Configuration(format!(
                    "{} is not a usable base URL",
                    self.config.endpoint
                ))
            })?;
            path.pop_if_empty();
            path.extend(route.split('/'));
            path.extend(segments);
        }
        Ok(url)
    }

    fn dry_run<T: Clone>(&self, action: &str, payload: &T) -> Option<T> {
        if self.config.dry_run {
            warn!("Dry run: not sending {action}");
            Some(payload.clone())
        } else {
            None
        }
    }

    // ── Transport ──────────────────────────────────────────────

    /// One call, with a single re-authentication on 401/403.
    ///
    /// `source` names the catalog source a read targets. A read that times
    /// out latches its source and later reads against it return `None`
    /// without touching the network.
    async fn request(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        source: Option<&str>,
    ) -> Result<Option<Value>> {
        let label = url.path().to_string();
        if let Some(source) = source {
            if self.is_latched(source) {
                debug!(source, url = %label, "Source timed out earlier in this run, skipping");
                return Ok(None);
            }
        }

        let mut reauthenticated = false;
        loop {
            let token = lock(&self.token).clone().unwrap_or_default();
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .header(AUTHORIZATION, token);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    error!(url = %label, "HTTP request timed out");
                    if method == Method::GET {
                        if let Some(source) = source {
                            lock(&self.timed_out_sources).insert(source.to_string());
                        }
                    }
                    return Ok(None);
                }
                Err(e) => {
                    error!(url = %label, error = %e, "HTTP request failed");
                    return Ok(None);
                }
            };

            let status = response.status();
            if status == StatusCode::OK {
                let text = response
                    .text()
                    .await
                    .map_err(|e| ClientError::unexpected(&label, e.to_string()))?;
                if text.trim().is_empty() {
                    return Ok(Some(Value::Null));
                }
                return serde_json::from_str(&text)
                    .map(Some)
                    .map_err(|e| ClientError::unexpected(&label, e.to_string()));
            }
            if status == StatusCode::NO_CONTENT {
                return Ok(None);
            }

            let detail = error_detail(response).await;
            match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    if reauthenticated {
                        error!(url = %label, %status, "{detail}");
                        return Err(ClientError::Authentication(format!(
                            "HTTP {status} for {label}{detail}"
                        )));
                    }
                    info!(url = %label, %status, "Re-authenticating");
                    self.authenticate().await?;
                    reauthenticated = true;
                    continue;
                }
                StatusCode::NOT_FOUND => {
                    info!(url = %label, %status, "Not found{detail}");
                }
                StatusCode::BAD_REQUEST if method == Method::GET => {
                    info!(url = %label, %status, "Bad request{detail}");
                }
                _ => {
                    error!(url = %label, %status, "Request rejected{detail}");
                }
            }
            return Ok(None);
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, source: Option<&str>) -> Result<Option<T>> {
        let label = url.path().to_string();
        let value = self.request(Method::GET, url, None, source).await?;
        decode(&label, value)
    }

    async fn send<B, T>(&self, method: Method, url: Url, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let label = url.path().to_string();
        let payload = serde_json::to_value(body)
            .map_err(|e| ClientError::unexpected(&label, format!("unserializable payload: {e}")))?;
        let value = self.request(method, url, Some(&payload), None).await?;
        decode(&label, value)
    }

    async fn get_list<T: DeserializeOwned>(&self, route: &str) -> Result<Option<Vec<T>>> {
        let url = self.url(route, std::iter::empty::<&str>())?;
        let envelope: Option<DataEnvelope<T>> = self.get(url, None).await?;
        Ok(envelope.map(|e| e.data))
    }
}

#[async_trait]
impl CatalogClient for RestCatalogClient {
    fn endpoint(&self) -> &str {
        &self.endpoint_label
    }

    async fn lookup_principal_by_name(
        &self,
        kind: PrincipalKind,
        name: &str,
    ) -> Result<Option<Principal>> {
        let url = self.url(&format!("api/v3/{}/by-name", kind.as_str()), [name])?;
        self.get(url, None).await
    }

    async fn get_principal_by_id(
        &self,
        kind: PrincipalKind,
        id: &str,
    ) -> Result<Option<Principal>> {
        let url = self.url(&format!("api/v3/{}", kind.as_str()), [id])?;
        self.get(url, None).await
    }

    async fn list_containers(&self) -> Result<Option<Vec<CatalogRef>>> {
        self.get_list(CATALOG).await
    }

    async fn get_entity_by_path(&self, path: &CatalogPath) -> Result<Option<Entity>> {
        let url = self.url(CATALOG_BY_PATH, path.segments())?;
        self.get(url, path.root()).await
    }

    async fn get_entity_by_id(&self, id: &str) -> Result<Option<Entity>> {
        if let Some(path) = id.strip_prefix(PATH_ID_PREFIX) {
            let path: CatalogPath = path.parse().unwrap_or_default();
            return self.get_entity_by_path(&path).await;
        }
        let url = self.url(CATALOG, [id])?;
        self.get(url, None).await
    }

    async fn create_entity(&self, entity: &Entity) -> Result<Option<Entity>> {
        if let Some(echo) = self.dry_run(&format!("create of {}", entity.label()), entity) {
            return Ok(Some(echo));
        }
        let url = self.url(CATALOG, std::iter::empty::<&str>())?;
        self.send(Method::POST, url, entity).await
    }

    async fn update_entity(&self, id: &str, entity: &Entity) -> Result<Option<Entity>> {
        if let Some(echo) = self.dry_run(&format!("update of {}", entity.label()), entity) {
            return Ok(Some(echo));
        }
        let url = self.url(CATALOG, [id])?;
        self.send(Method::PUT, url, entity).await
    }

    async fn promote_physical_dataset(&self, dataset: &Entity) -> Result<Option<Entity>> {
        let Some(id) = dataset.id() else {
            warn!(dataset = %dataset.path(), "Cannot promote a dataset without an id");
            return Ok(None);
        };
        if let Some(echo) = self.dry_run(&format!("promotion of {}", dataset.path()), dataset) {
            return Ok(Some(echo));
        }
        let url = self.url(CATALOG, [id])?;
        self.send(Method::POST, url, dataset).await
    }

    async fn get_lineage(&self, entity_id: &str) -> Result<Option<Lineage>> {
        let url = self.url(CATALOG, [entity_id, "graph"])?;
        self.get(url, None).await
    }

    async fn list_reflections(&self) -> Result<Option<Vec<Reflection>>> {
        self.get_list(REFLECTION).await
    }

    async fn create_reflection(&self, reflection: &Reflection) -> Result<Option<Reflection>> {
        if let Some(echo) = self.dry_run(&format!("create of reflection {}", reflection.name), reflection) {
            return Ok(Some(echo));
        }
        let url = self.url(REFLECTION, std::iter::empty::<&str>())?;
        self.send(Method::POST, url, reflection).await
    }

    async fn update_reflection(
        &self,
        id: &str,
        reflection: &Reflection,
    ) -> Result<Option<Reflection>> {
        if let Some(echo) = self.dry_run(&format!("update of reflection {}", reflection.name), reflection) {
            return Ok(Some(echo));
        }
        let url = self.url(REFLECTION, [id])?;
        self.send(Method::PUT, url, reflection).await
    }

    async fn get_wiki(&self, entity_id: &str) -> Result<Option<Wiki>> {
        let url = self.url(CATALOG, [entity_id, "collaboration", "wiki"])?;
        self.get(url, None).await
    }

    async fn update_wiki(&self, entity_id: &str, wiki: &Wiki) -> Result<Option<Wiki>> {
        if let Some(echo) = self.dry_run(&format!("wiki of {entity_id}"), wiki) {
            return Ok(Some(echo));
        }
        let url = self.url(CATALOG, [entity_id, "collaboration", "wiki"])?;
        self.send(Method::POST, url, wiki).await
    }

    async fn get_tags(&self, entity_id: &str) -> Result<Option<Tags>> {
        let url = self.url(CATALOG, [entity_id, "collaboration", "tag"])?;
        self.get(url, None).await
    }

    async fn update_tags(&self, entity_id: &str, tags: &Tags) -> Result<Option<Tags>> {
        if let Some(echo) = self.dry_run(&format!("tags of {entity_id}"), tags) {
            return Ok(Some(echo));
        }
        let url = self.url(CATALOG, [entity_id, "collaboration", "tag"])?;
        self.send(Method::POST, url, tags).await
    }

    async fn list_queues(&self) -> Result<Option<Vec<WlmQueue>>> {
        self.get_list(WLM_QUEUE).await
    }

    async fn list_rules(&self) -> Result<Option<Vec<WlmRule>>> {
        let url = self.url(WLM_RULE, std::iter::empty::<&str>())?;
        let rules: Option<RuleSet> = self.get(url, None).await?;
        Ok(rules.map(|r| r.rules))
    }

    async fn list_votes(&self) -> Result<Option<Vec<Vote>>> {
        self.get_list(VOTE).await
    }

    async fn submit_sql(
        &self,
        sql: &str,
        context: Option<&CatalogPath>,
    ) -> Result<Option<JobHandle>> {
        let url = self.url(SQL, std::iter::empty::<&str>())?;
        let request = SqlRequest {
            sql: sql.to_string(),
            context: context.cloned(),
        };
        self.send(Method::POST, url, &request).await
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<JobStatus>> {
        let url = self.url(JOB, [job_id])?;
        self.get(url, None).await
    }

    async fn get_job_results(
        &self,
        job_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Option<JobResults>> {
        let mut url = self.url(JOB, [job_id, "results"])?;
        url.query_pairs_mut()
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &limit.to_string());
        self.get(url, None).await
    }
}

fn decode<T: DeserializeOwned>(label: &str, value: Option<Value>) -> Result<Option<T>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ClientError::unexpected(label, e.to_string())),
    }
}

async fn error_detail(response: reqwest::Response) -> String {
    let text = response.text().await.unwrap_or_default();
    let Ok(body) = serde_json::from_str::<Value>(&text) else {
        return if text.is_empty() {
            String::new()
        } else {
            format!(" content: {text}")
        };
    };
    let mut detail = String::new();
    if let Some(message) = body.get("errorMessage") {
        detail.push_str(&format!(" errorMessage: {message}"));
    }
    if let Some(more) = body.get("moreInfo") {
        detail.push_str(&format!(" moreInfo: {more}"));
    }
    detail
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
