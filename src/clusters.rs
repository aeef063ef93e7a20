use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::error::{AssistantError, Result};
use crate::prompt::ClusterContext;

const SERVICE: &str = "eks";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub name: String,
    pub status: String,
    pub version: String,
    pub endpoint: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl ClusterSummary {
    pub fn context(&self) -> ClusterContext {
        ClusterContext {
            name: self.name.clone(),
            status: self.status.clone(),
            version: self.version.clone(),
        }
    }
}

/// Read-only view of the managed clusters in the configured account/region.
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    async fn list_clusters(&self) -> Result<Vec<ClusterSummary>>;
    async fn describe_cluster(&self, name: &str) -> Result<ClusterSummary>;
}

/// EKS REST client. `base` is either the regional EKS endpoint (with a
/// bearer token) or a request-signing proxy in front of it.
#[derive(Clone)]
pub struct HttpClusterRegistry {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
    proxied: bool,
}

impl HttpClusterRegistry {
    pub fn new(base: Url, token: Option<String>, proxied: bool) -> Self {
        Self { http: reqwest::Client::new(), base, token, proxied }
    }

    fn request(&self, url: Url) -> Result<reqwest::RequestBuilder> {
        let rb = self.http.get(url).header(reqwest::header::ACCEPT, "application/json");
        match (&self.token, self.proxied) {
            (Some(token), _) => Ok(rb.bearer_auth(token)),
            (None, true) => Ok(rb),
            (None, false) => Err(AssistantError::credentials(
                SERVICE,
                "set EKS_ENDPOINT to a signing proxy or EKS_BEARER_TOKEN",
            )),
        }
    }

    async fn fetch<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<T> {
        let resp = self
            .request(url)?
            .send()
            .await
            .map_err(|e| AssistantError::service(SERVICE, e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            tracing::warn!(%status, "eks request failed");
            return Err(AssistantError::service(SERVICE, format!("{status}: {}", detail.trim())));
        }
        resp.json()
            .await
            .map_err(|e| AssistantError::service(SERVICE, format!("decoding response: {e}")))
    }

    async fn cluster_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let mut url = endpoint(&self.base, &["clusters"])?;
            if let Some(token) = &next_token {
                url.query_pairs_mut().append_pair("nextToken", token);
            }
            let page: ListClustersPage = self.fetch(url).await?;
            names.extend(page.clusters);
            // A repeated token would page forever.
            match page.next_token {
                Some(t) if !t.is_empty() && next_token.as_deref() != Some(t.as_str()) => {
                    next_token = Some(t)
                }
                _ => break,
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl ClusterRegistry for HttpClusterRegistry {
    async fn list_clusters(&self) -> Result<Vec<ClusterSummary>> {
        let names = self.cluster_names().await?;
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            out.push(self.describe_cluster(&name).await?);
        }
        tracing::info!(count = out.len(), "listed clusters");
        Ok(out)
    }

    async fn describe_cluster(&self, name: &str) -> Result<ClusterSummary> {
        if name.trim().is_empty() {
            return Err(AssistantError::validation("cluster name is empty"));
        }
        let url = endpoint(&self.base, &["clusters", name])?;
        let described: DescribeClusterResponse = self.fetch(url).await?;
        Ok(described.cluster.into())
    }
}

/// Appends path segments to `base`, percent-encoding each one.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| AssistantError::validation(format!("endpoint {base} cannot take a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListClustersPage {
    #[serde(default)]
    clusters: Vec<String>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DescribeClusterResponse {
    cluster: EksCluster,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EksCluster {
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    version: String,
    endpoint: Option<String>,
    #[serde(default, deserialize_with = "epoch_seconds")]
    created_at: Option<DateTime<Utc>>,
}

impl From<EksCluster> for ClusterSummary {
    fn from(c: EksCluster) -> Self {
        Self {
            name: c.name,
            status: c.status,
            version: c.version,
            endpoint: c.endpoint,
            created_at: c.created_at,
        }
    }
}

// EKS encodes timestamps as fractional epoch seconds.
fn epoch_seconds<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
    let secs: Option<f64> = Option::deserialize(d)?;
    Ok(secs.and_then(|s| DateTime::from_timestamp(s.trunc() as i64, (s.fract() * 1e9) as u32)))
}
