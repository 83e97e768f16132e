use std::{ops::Deref, sync::Arc};

use reqwest::{Client, ClientBuilder};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};

use crate::MpdResult;

/// A reqwest [`Client`] with a cookie store, so cookies set while loading the
/// manifest are sent along with its segment requests.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(builder: ClientBuilder) -> MpdResult<Self> {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = builder.cookie_provider(cookies_store).build()?;

        Ok(Self { client })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        // Same failure mode as `reqwest::Client::new`.
        Self::new(Client::builder()).expect("failed to initialize the HTTP client")
    }
}

impl Deref for HttpClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}
