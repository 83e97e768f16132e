use std::{fmt, future::Future, sync::Arc};

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method, StatusCode,
};
use url::Url;

use crate::{util::http::HttpClient, MpdError, MpdResult};

/// How the body of a response is going to be consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseType {
    /// Must be valid UTF-8.
    Text,
    #[default]
    ArrayBuffer,
}

/// Notifications about one request, delivered through a [`LoadHook`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadEvent {
    /// `total` is the announced content length, if any.
    Progress { loaded: u64, total: Option<u64> },
    Success { loaded: u64 },
    Error {
        status: Option<StatusCode>,
        message: String,
    },
    /// The request was dropped before it finished.
    Abort,
}

#[derive(Clone)]
pub struct LoadHook(Arc<dyn Fn(&LoadEvent) + Send + Sync>);

impl LoadHook {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(&LoadEvent) + Send + Sync + 'static,
    {
        Self(Arc::new(hook))
    }

    pub fn call(&self, event: &LoadEvent) {
        (self.0)(event)
    }
}

impl fmt::Debug for LoadHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LoadHook")
    }
}

#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub url: Url,
    pub response_type: ResponseType,
    pub method: Method,
    pub headers: HeaderMap,
    pub hook: Option<LoadHook>,
}

impl LoadRequest {
    /// A `GET` request for binary content.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            response_type: ResponseType::ArrayBuffer,
            method: Method::GET,
            headers: HeaderMap::new(),
            hook: None,
        }
    }

    /// A `GET` request for a text document, such as a manifest.
    pub fn text(url: Url) -> Self {
        Self {
            response_type: ResponseType::Text,
            ..Self::new(url)
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn hook(mut self, hook: Option<LoadHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn notify(&self, event: LoadEvent) {
        if let Some(hook) = &self.hook {
            hook.call(&event);
        }
    }

    fn fail(&self, error: MpdError) -> MpdError {
        let status = match &error {
            MpdError::HttpError(status) => Some(*status),
            MpdError::RequestError(e) => e.status(),
            _ => None,
        };
        self.notify(LoadEvent::Error {
            status,
            message: error.to_string(),
        });
        error
    }
}

pub trait SegmentLoader: Send + Sync {
    fn load(&self, request: LoadRequest) -> impl Future<Output = MpdResult<Bytes>> + Send;
}

/// Loads over HTTP(S), and from disk for `file://` URLs.
#[derive(Clone, Default)]
pub struct HttpLoader {
    client: HttpClient,
}

impl HttpLoader {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    async fn read_file(request: &LoadRequest) -> MpdResult<Bytes> {
        let path = request.url.to_file_path().map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a local path", request.url),
            )
        })?;
        tracing::debug!("Reading {}", path.display());
        let data = tokio::fs::read(path).await?;

        let loaded = data.len() as u64;
        request.notify(LoadEvent::Progress {
            loaded,
            total: Some(loaded),
        });
        Ok(Bytes::from(data))
    }

    async fn fetch(client: HttpClient, request: &LoadRequest) -> MpdResult<Bytes> {
        tracing::debug!("Requesting {} {}", request.method, request.url);
        let response = client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .send()
            .await?;

        let status = response.status();
        // 304 carries no body, but the cached copy is still valid
        if !status.is_success() && status != StatusCode::NOT_MODIFIED {
            if let Ok(body) = response.text().await {
                tracing::warn!("Error body: {body}");
            }
            return Err(MpdError::HttpError(status));
        }

        let total = response.content_length();
        let mut body = BytesMut::with_capacity(total.unwrap_or_default() as usize);
        let mut stream = std::pin::pin!(response.bytes_stream());
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
            request.notify(LoadEvent::Progress {
                loaded: body.len() as u64,
                total,
            });
        }
        Ok(body.freeze())
    }
}

impl SegmentLoader for HttpLoader {
    fn load(&self, request: LoadRequest) -> impl Future<Output = MpdResult<Bytes>> + Send {
        let client = self.client.clone();
        async move {
            let result = if request.url.scheme() == "file" {
                Self::read_file(&request).await
            } else {
                Self::fetch(client, &request).await
            };

            let data = result.map_err(|e| request.fail(e))?;
            if request.response_type == ResponseType::Text {
                if let Err(e) = std::str::from_utf8(&data) {
                    return Err(request.fail(MpdError::ManifestParse(format!(
                        "{} is not UTF-8: {e}",
                        request.url
                    ))));
                }
            }

            request.notify(LoadEvent::Success {
                loaded: data.len() as u64,
            });
            Ok(data)
        }
    }
}
