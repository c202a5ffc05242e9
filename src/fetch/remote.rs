//! Загрузка модулей с доверенных CDN.

use super::{Fetcher, HttpClient};
use crate::context::LoadContext;
use crate::error::FetchError;

/// Фетчер удалённых модулей: один GET на модуль.
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    http: HttpClient,
}

impl RemoteFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

impl Fetcher for RemoteFetcher {
    fn fetch(&self, ctx: &LoadContext, specifier: &str) -> Result<String, FetchError> {
        let response = self.http.get(ctx, specifier)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: specifier.to_string(),
                status: status.as_u16(),
            });
        }

        let body = self.http.read_body(ctx, response, specifier)?;
        String::from_utf8(body).map_err(|e| FetchError::Read {
            path: specifier.to_string(),
            reason: e.to_string(),
        })
    }
}
