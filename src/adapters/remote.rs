//! Remote object store speaking a small HTTP object-gateway protocol.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | upload | `PUT {endpoint}/objects/{key}` with the raw body |
//! | download | `GET {endpoint}/objects/{key}` |
//! | copy | `POST {endpoint}/copy` with `{"from", "to", "recursive"}` |
//! | delete folder | `DELETE {endpoint}/objects/{key}?recursive=true` |
//!
//! Every request carries the acting member in `X-Actor-Id` and, when
//! configured, a bearer token.

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use tracing::debug;

use super::{ByteStream, ObjectStore, StorageError, StorageResult};
use crate::domain::Actor;

/// Header carrying the acting member id
pub const ACTOR_HEADER: &str = "X-Actor-Id";

/// Client for a remote object gateway
pub struct RemoteObjectStore {
    endpoint: Url,
    token: Option<String>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct CopyRequest<'a> {
    from: &'a str,
    to: &'a str,
    recursive: bool,
}

impl RemoteObjectStore {
    /// Create a client for the gateway at `endpoint`
    pub fn new(endpoint: impl AsRef<str>, token: Option<String>) -> StorageResult<Self> {
        let endpoint = endpoint.as_ref();
        let mut endpoint = Url::parse(endpoint).map_err(|e| StorageError::Backend {
            backend: "remote".to_string(),
            message: format!("invalid endpoint '{}': {}", endpoint, e),
        })?;

        // copy_url joins onto the endpoint, which needs a trailing slash
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        Ok(Self {
            endpoint,
            token,
            client: Client::new(),
        })
    }

    /// URL of the object stored at `key`.
    ///
    /// Each key segment is percent-encoded on its own, so `#`, `?` and `%`
    /// in file names stay part of the object path.
    pub fn object_url(&self, key: &str) -> StorageResult<Url> {
        let key = key.trim_start_matches('/');
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidPath {
                path: key.to_string(),
                reason: format!("endpoint '{}' cannot be a base URL", self.endpoint),
            })?
            .pop_if_empty()
            .push("objects")
            .extend(key.split('/'));
        Ok(url)
    }

    fn copy_url(&self) -> StorageResult<Url> {
        self.endpoint
            .join("copy")
            .map_err(|e| StorageError::Backend {
                backend: "remote".to_string(),
                message: e.to_string(),
            })
    }

    fn authorize(&self, request: RequestBuilder, actor: &Actor) -> RequestBuilder {
        let request = request.header(ACTOR_HEADER, actor.id.as_str());
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Turn non-success responses into errors
    async fn check(response: Response, path: &str) -> StorageResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(path.to_string()));
        }
        let message = response.text().await.unwrap_or_default();
        Err(StorageError::Http {
            status: status.as_u16(),
            path: path.to_string(),
            message: message.trim().to_string(),
        })
    }

    async fn copy(&self, from: &str, to: &str, recursive: bool, actor: &Actor) -> StorageResult<()> {
        let request = self
            .client
            .post(self.copy_url()?)
            .json(&CopyRequest { from, to, recursive });
        let response = self.authorize(request, actor).send().await?;
        Self::check(response, from).await?;
        debug!(from, to, recursive, "Copied on remote gateway");
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for RemoteObjectStore {
    fn name(&self) -> &str {
        "remote"
    }

    async fn upload(
        &self,
        path: &str,
        mut body: ByteStream,
        mime_type: &str,
        size: u64,
        actor: &Actor,
    ) -> StorageResult<()> {
        let url = self.object_url(path)?;

        // Package assets are bounded by the archive size limit, so buffering is fine
        let mut buffer = Vec::with_capacity(size as usize);
        body.read_to_end(&mut buffer)
            .await
            .map_err(|e| StorageError::io(path, e))?;

        let request = self
            .client
            .put(url)
            .header(CONTENT_TYPE, mime_type)
            .body(buffer);

        let response = self.authorize(request, actor).send().await?;
        Self::check(response, path).await?;
        debug!(path, mime_type, size, "Uploaded to remote gateway");
        Ok(())
    }

    async fn download(&self, path: &str, actor: &Actor) -> StorageResult<ByteStream> {
        let request = self.client.get(self.object_url(path)?);
        let response = self.authorize(request, actor).send().await?;
        let response = Self::check(response, path).await?;

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }

    async fn copy_file(&self, from: &str, to: &str, actor: &Actor) -> StorageResult<()> {
        self.copy(from, to, false, actor).await
    }

    async fn copy_folder(&self, from: &str, to: &str, actor: &Actor) -> StorageResult<()> {
        self.copy(from, to, true, actor).await
    }

    async fn delete_folder(&self, path: &str, actor: &Actor) -> StorageResult<()> {
        let mut url = self.object_url(path)?;
        url.query_pairs_mut().append_pair("recursive", "true");

        let response = self.authorize(self.client.delete(url), actor).send().await?;
        match Self::check(response, path).await {
            Ok(_) | Err(StorageError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
