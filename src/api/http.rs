//! HTTP implementation of `StorageApi`
//!
//! Routes match the hashstorage server surface:
//! `GET /version`, `GET /groups/{pk}`, `GET /keys/{pk}/{group}`,
//! `GET /info/{pk}/{group}/{key}`, `GET /data/{pk}/{group}/{key}`,
//! `POST /data/{pk}/{group}/{key}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::types::{BlockInfoJson, BlockJson, ConflictJson, GroupsJson, KeysJson, VersionInfo};
use super::{ApiError, StorageApi};

pub struct HttpApi {
    root: String,
    http: reqwest::Client,
}

impl HttpApi {
    /// Bind to a server endpoint. No network call is made until the first
    /// operation.
    pub fn new(root: &str) -> Self {
        Self {
            root: root.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Bind with a per-request timeout. A timed-out call surfaces as
    /// `ApiError::Network` and leaves no partial state behind.
    pub fn with_timeout(root: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self {
            root: root.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    fn data_url(&self, public_key: &str, group: &str, key: &str) -> String {
        format!("{}/data/{}/{}/{}", self.root, public_key, group, key)
    }

    fn info_url(&self, public_key: &str, group: &str, key: &str) -> String {
        format!("{}/info/{}/{}/{}", self.root, public_key, group, key)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let resp = self.http.get(url).send().await?;
        Self::decode(resp).await
    }

    /// Map a response onto the error taxonomy. 200 decodes the body; every
    /// other status is a typed failure, never silently swallowed.
    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        match resp.status().as_u16() {
            200 => resp
                .json()
                .await
                .map_err(|e| ApiError::Malformed(e.to_string())),
            401 | 403 => Err(ApiError::Unauthorized),
            404 => Err(ApiError::NotFound),
            409 => {
                let conflict: ConflictJson = resp
                    .json()
                    .await
                    .map_err(|e| ApiError::Malformed(format!("conflict body: {}", e)))?;
                Err(ApiError::VersionConflict {
                    current: conflict.version,
                })
            }
            status => {
                log::warn!("Unexpected status {} from hashstorage server", status);
                Err(ApiError::UnexpectedStatus(status))
            }
        }
    }
}

#[async_trait]
impl StorageApi for HttpApi {
    async fn server_version(&self) -> Result<VersionInfo, ApiError> {
        self.get_json(&format!("{}/version", self.root)).await
    }

    async fn list_groups(&self, public_key: &str) -> Result<Vec<String>, ApiError> {
        let groups: GroupsJson = self
            .get_json(&format!("{}/groups/{}", self.root, public_key))
            .await?;
        Ok(groups.groups)
    }

    async fn list_keys(&self, public_key: &str, group: &str) -> Result<Vec<String>, ApiError> {
        let keys: KeysJson = self
            .get_json(&format!("{}/keys/{}/{}", self.root, public_key, group))
            .await?;
        Ok(keys.keys)
    }

    async fn block_info(
        &self,
        public_key: &str,
        group: &str,
        key: &str,
    ) -> Result<BlockInfoJson, ApiError> {
        self.get_json(&self.info_url(public_key, group, key)).await
    }

    async fn get_block(
        &self,
        public_key: &str,
        group: &str,
        key: &str,
    ) -> Result<BlockJson, ApiError> {
        self.get_json(&self.data_url(public_key, group, key)).await
    }

    async fn put_block(&self, block: BlockJson) -> Result<BlockJson, ApiError> {
        let url = self.data_url(&block.public, &block.group, &block.key);
        let resp = self.http.post(&url).json(&block.to_input()).send().await?;
        Self::decode(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one canned HTTP response on a local port and return
    /// the base URL to reach it.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Drain the request head; these requests fit in one read
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;

            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });

        format!("http://{}", addr)
    }

    fn signed_block(id: &Identity, version: u64, data: &str) -> BlockJson {
        BlockJson {
            public: id.public_key(),
            group: "mygroup".to_string(),
            key: "mykey".to_string(),
            version,
            data: data.to_string(),
            signature: id.sign_block("mygroup", "mykey", version, data).unwrap(),
        }
    }

    #[test]
    fn test_root_is_normalized() {
        let api = HttpApi::new("http://localhost:8000/");
        assert_eq!(api.root(), "http://localhost:8000");
    }

    #[test]
    fn test_data_url_layout() {
        let api = HttpApi::new("http://localhost:8000");
        assert_eq!(
            api.data_url("aabb", "mygroup", "mykey"),
            "http://localhost:8000/data/aabb/mygroup/mykey"
        );
        assert_eq!(
            api.info_url("aabb", "mygroup", "mykey"),
            "http://localhost:8000/info/aabb/mygroup/mykey"
        );
    }

    #[tokio::test]
    async fn test_200_decodes_block_json() {
        let id = Identity::derive("app1", "alex", "Qwerty123").unwrap();
        let block = signed_block(&id, 1, "Hello world");
        let body: &'static str =
            Box::leak(serde_json::to_string(&block).unwrap().into_boxed_str());

        let root = serve_once("200 OK", body).await;
        let api = HttpApi::new(&root);

        let fetched = api
            .get_block(&id.public_key(), "mygroup", "mykey")
            .await
            .unwrap();
        assert_eq!(fetched.version, 1);
        assert_eq!(fetched.data, "Hello world");
    }

    #[tokio::test]
    async fn test_404_maps_to_not_found() {
        let root = serve_once("404 Not Found", "{}").await;
        let api = HttpApi::new(&root);

        assert!(matches!(
            api.get_block("aabb", "mygroup", "mykey").await,
            Err(ApiError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_401_maps_to_unauthorized() {
        let root = serve_once("401 Unauthorized", "{}").await;
        let api = HttpApi::new(&root);

        assert!(matches!(
            api.server_version().await,
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_409_carries_current_version() {
        let id = Identity::derive("app1", "alex", "Qwerty123").unwrap();
        let root = serve_once("409 Conflict", r#"{"version": 7}"#).await;
        let api = HttpApi::new(&root);

        match api.put_block(signed_block(&id, 8, "late write")).await {
            Err(ApiError::VersionConflict { current }) => assert_eq!(current, 7),
            other => panic!("expected VersionConflict, got {:?}", other.map(|b| b.version)),
        }
    }

    #[tokio::test]
    async fn test_409_with_undecodable_body_is_malformed() {
        let id = Identity::derive("app1", "alex", "Qwerty123").unwrap();
        let root = serve_once("409 Conflict", "not json").await;
        let api = HttpApi::new(&root);

        assert!(matches!(
            api.put_block(signed_block(&id, 2, "late write")).await,
            Err(ApiError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_unexpected_status_is_surfaced() {
        let root = serve_once("500 Internal Server Error", "{}").await;
        let api = HttpApi::new(&root);

        assert!(matches!(
            api.server_version().await,
            Err(ApiError::UnexpectedStatus(500))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_network_error() {
        // Bind then drop to get a port with nothing listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let api = HttpApi::new(&format!("http://{}", addr));
        assert!(matches!(
            api.server_version().await,
            Err(ApiError::Network(_))
        ));
    }
}
