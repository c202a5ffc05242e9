//! Общий блокирующий HTTP-клиент для CDN и реестра.

use std::io::{ErrorKind, Read};
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::redirect::Policy;

use crate::context::LoadContext;
use crate::error::FetchError;
use crate::modules::is_trusted_url;

const USER_AGENT: &str = concat!("edon/", env!("CARGO_PKG_VERSION"));

/// Размер блока при чтении тела ответа.
const CHUNK_SIZE: usize = 16 * 1024;

/// Предел цепочки перенаправлений.
const MAX_REDIRECTS: usize = 10;

/// HTTP-клиент с учётом отмены и крайнего срока контекста.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Option<Duration>,
}

impl HttpClient {
    /// Создать клиент с таймаутом по умолчанию для каждого запроса.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self::with_policy(timeout, Policy::limited(MAX_REDIRECTS))
    }

    /// Клиент, который следует перенаправлениям только на доверенные хосты.
    ///
    /// Перенаправление на другой хост не выполняется: вызывающий получает
    /// сам ответ 3xx.
    pub fn restricted(timeout: Option<Duration>, allowed_hosts: Vec<String>) -> Self {
        let policy = Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if is_trusted_url(attempt.url(), &allowed_hosts) {
                attempt.follow()
            } else {
                log::warn!("refusing redirect to untrusted {}", attempt.url());
                attempt.stop()
            }
        });
        Self::with_policy(timeout, policy)
    }

    fn with_policy(timeout: Option<Duration>, policy: Policy) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(policy)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("falling back to a client without redirects: {}", e);
                Client::builder()
                    .redirect(Policy::none())
                    .build()
                    .unwrap_or_else(|_| Client::new())
            });
        Self { client, timeout }
    }

    /// Выполнить GET-запрос.
    ///
    /// Таймаут запроса - меньшее из таймаута клиента и остатка времени
    /// контекста. Истечение срока контекста даёт `Cancelled`, а не сетевую
    /// ошибку.
    pub fn get(&self, ctx: &LoadContext, url: &str) -> Result<Response, FetchError> {
        ctx.check()?;

        let mut request = self.client.get(url);
        if let Some(timeout) = self.effective_timeout(ctx) {
            request = request.timeout(timeout);
        }

        log::info!("GET {}", url);
        let response = request.send().map_err(|e| {
            if e.is_timeout() && ctx.is_done() {
                FetchError::Cancelled
            } else {
                FetchError::Network {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        ctx.check()?;
        Ok(response)
    }

    /// Прочитать тело ответа целиком, проверяя отмену между блоками.
    pub fn read_body(
        &self,
        ctx: &LoadContext,
        mut response: Response,
        url: &str,
    ) -> Result<Vec<u8>, FetchError> {
        let mut body = Vec::new();
        let mut chunk = vec![0u8; CHUNK_SIZE];

        loop {
            ctx.check()?;
            match response.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => body.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::TimedOut && ctx.is_done() => {
                    return Err(FetchError::Cancelled)
                }
                Err(e) => {
                    return Err(FetchError::Read {
                        path: url.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }

        Ok(body)
    }

    fn effective_timeout(&self, ctx: &LoadContext) -> Option<Duration> {
        match (self.timeout, ctx.remaining()) {
            (Some(own), Some(left)) => Some(own.min(left)),
            (own, left) => own.or(left),
        }
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(None)
    }
}
