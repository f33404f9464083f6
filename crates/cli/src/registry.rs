//! Registry client for listing container image tags

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use url::Url;

/// Docker Hub repository API base.
pub const DOCKER_HUB_URL: &str = "https://registry.hub.docker.com";

/// Red Hat registry API base.
pub const REDHAT_REGISTRY_URL: &str = "https://registry.access.redhat.com";

const PAGE_SIZE: u32 = 100;

/// One page of Docker Hub tags.
#[derive(Debug, Clone, Deserialize)]
pub struct TagPage {
    pub next: Option<String>,
    pub results: Vec<TagEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagEntry {
    pub name: String,
}

/// Docker registry v2 tag list.
#[derive(Debug, Clone, Deserialize)]
pub struct TagList {
    pub tags: Vec<String>,
}

/// Client for the public image registries
pub struct RegistryClient {
    client: Client,
    base_url: Url,
}

impl RegistryClient {
    /// Create a new registry client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid registry URL")?;

        Ok(Self { client, base_url })
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Registry error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Tags of a Docker Hub repository, as `repository:tag`.
    ///
    /// Only the first page unless `all`.
    pub async fn docker_hub_tags(&self, repository: &str, all: bool) -> Result<Vec<String>> {
        let mut url = self
            .base_url
            .join(&format!("v2/repositories/{}/tags/", repository))
            .context("Invalid repository")?;
        url.query_pairs_mut()
            .append_pair("page_size", &PAGE_SIZE.to_string())
            .append_pair("page", "1");

        let mut tags = Vec::new();
        loop {
            let page: TagPage = self.get(url).await?;
            tags.extend(
                page.results
                    .into_iter()
                    .map(|entry| format!("{}:{}", repository, entry.name)),
            );

            match page.next {
                Some(next) if all => {
                    url = Url::parse(&next).context("Invalid next page URL")?;
                }
                _ => break,
            }
        }
        Ok(tags)
    }

    /// Tags of a registry v2 repository, as `<host>/repository:tag`.
    pub async fn registry_v2_tags(&self, repository: &str) -> Result<Vec<String>> {
        let url = self
            .base_url
            .join(&format!("v2/{}/tags/list", repository))
            .context("Invalid repository")?;
        let list: TagList = self.get(url).await?;

        let host = self.base_url.host_str().unwrap_or_default();
        Ok(list
            .tags
            .into_iter()
            .map(|tag| format!("{}/{}:{}", host, repository, tag))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_docker_hub_first_page_only() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/repositories/ceph/daemon/tags/")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("page_size".into(), "100".into()),
                mockito::Matcher::UrlEncoded("page".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body(format!(
                r#"{{"count": 2, "next": "{}/v2/repositories/ceph/daemon/tags/?page=2", "results": [{{"name": "latest-mimic"}}]}}"#,
                server.url()
            ))
            .expect(1)
            .create_async()
            .await;

        let client = RegistryClient::new(&server.url()).unwrap();
        let tags = client.docker_hub_tags("ceph/daemon", false).await.unwrap();

        assert_eq!(tags, vec!["ceph/daemon:latest-mimic"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_docker_hub_follows_next_with_all() {
        let mut server = mockito::Server::new_async().await;
        let next = format!("{}/v2/repositories/ceph/daemon/tags/?page=2", server.url());
        server
            .mock("GET", "/v2/repositories/ceph/daemon/tags/")
            .match_query(mockito::Matcher::UrlEncoded("page".into(), "1".into()))
            .with_body(format!(
                r#"{{"count": 2, "next": "{}", "results": [{{"name": "a"}}]}}"#,
                next
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/v2/repositories/ceph/daemon/tags/")
            .match_query(mockito::Matcher::UrlEncoded("page".into(), "2".into()))
            .with_body(r#"{"count": 2, "next": null, "results": [{"name": "b"}]}"#)
            .create_async()
            .await;

        let client = RegistryClient::new(&server.url()).unwrap();
        let tags = client.docker_hub_tags("ceph/daemon", true).await.unwrap();
        assert_eq!(tags, vec!["ceph/daemon:a", "ceph/daemon:b"]);
    }

    #[tokio::test]
    async fn test_registry_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/rhceph/rhceph-3-rhel7/tags/list")
            .with_status(503)
            .create_async()
            .await;

        let client = RegistryClient::new(&server.url()).unwrap();
        assert!(client.registry_v2_tags("rhceph/rhceph-3-rhel7").await.is_err());
    }
}
