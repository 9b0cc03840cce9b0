use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::core::{BlobStore, BoxError};
use crate::services::blob::{validate_key, BlobError};

/// Blob store speaking plain HTTP to an object storage gateway
///
/// Objects live at `{endpoint}/{bucket}/{key}`. Writes are `PUT`, reads are
/// `GET`, and a `404` on read means the key does not exist.
pub struct HttpBlobStore {
    endpoint: String,
    bucket: String,
    access_token: Option<String>,
    client: Client,
}

impl HttpBlobStore {
    pub fn new(
        endpoint: String,
        bucket: String,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BlobError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint,
            bucket,
            access_token,
            client,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            urlencoding::encode(&self.bucket),
            urlencoding::encode(key)
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError> {
        validate_key(key)?;
        let url = self.object_url(key);
        tracing::debug!("Uploading {} bytes to {}", bytes.len(), url);

        let response = self
            .authorize(self.client.put(&url))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BlobError::Status {
                status: response.status().as_u16(),
                key: key.to_string(),
            });
        }

        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        validate_key(key)?;
        let url = self.object_url(key);

        let response = self.authorize(self.client.get(&url)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(BlobError::Status {
                status: response.status().as_u16(),
                key: key.to_string(),
            });
        }

        Ok(Some(response.bytes().await?.to_vec()))
    }
}

impl BlobStore for HttpBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BoxError> {
        Ok(self.upload(key, bytes).await?)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError> {
        Ok(self.download(key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(server: &mockito::Server, token: Option<&str>) -> HttpBlobStore {
        HttpBlobStore::new(
            server.url(),
            "farmers-markets".to_string(),
            token.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_sends_bytes_with_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/farmers-markets/abc.csv")
            .match_header("authorization", "Bearer secret")
            .match_body("name,city\n")
            .with_status(200)
            .create_async()
            .await;

        store(&server, Some("secret"))
            .put("abc.csv", b"name,city\n".to_vec())
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_put_failure_status_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("PUT", "/farmers-markets/abc.csv")
            .with_status(503)
            .create_async()
            .await;

        let result = store(&server, None).put("abc.csv", vec![1, 2, 3]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_get_found_and_missing() {
        let mut server = mockito::Server::new_async().await;
        let _found = server
            .mock("GET", "/farmers-markets/abc.pdf")
            .with_status(200)
            .with_body("%PDF-1.4")
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/farmers-markets/gone.pdf")
            .with_status(404)
            .create_async()
            .await;

        let store = store(&server, None);
        assert_eq!(store.get("abc.pdf").await.unwrap(), Some(b"%PDF-1.4".to_vec()));
        assert_eq!(store.get("gone.pdf").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_key_never_reaches_server() {
        let server = mockito::Server::new_async().await;
        let result = store(&server, None).put("../escape", vec![]).await;
        assert!(result.is_err());
    }
}
