//! Вспомогательные средства для тестов: локальный HTTP-сервер и архивы пакетов.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha512};
use tiny_http::{Header, Response, Server, StatusCode};

/// Ответ на один путь.
#[derive(Debug, Clone)]
pub struct Route {
    status: u16,
    body: Vec<u8>,
    delay: Duration,
    location: Option<String>,
    trickle: Option<Duration>,
}

impl Route {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::ZERO,
            location: None,
            trickle: None,
        }
    }

    /// 302 на `location`.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            location: Some(location.into()),
            ..Self::status(302, "")
        }
    }

    /// Задержка перед заголовками ответа.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Отдавать тело по 1 КиБ с паузой между кусками.
    pub fn trickled(mut self, pause: Duration) -> Self {
        self.trickle = Some(pause);
        self
    }
}

/// Читатель, отдающий данные небольшими кусками с паузами.
struct Trickle {
    data: io::Cursor<Vec<u8>>,
    pause: Duration,
}

impl Read for Trickle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        thread::sleep(self.pause);
        let len = buf.len().min(1024);
        self.data.read(&mut buf[..len])
    }
}

#[derive(Default)]
struct State {
    routes: HashMap<String, Route>,
    hits: HashMap<String, usize>,
}

/// HTTP-сервер на 127.0.0.1 со случайным портом.
pub struct TestServer {
    server: Arc<Server>,
    port: u16,
    state: Arc<Mutex<State>>,
}

impl TestServer {
    pub fn start() -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").unwrap());
        let port = server.server_addr().to_ip().unwrap().port();
        let state = Arc::new(Mutex::new(State::default()));

        let worker_server = server.clone();
        let worker_state = state.clone();
        thread::spawn(move || {
            for request in worker_server.incoming_requests() {
                let path = request.url().to_string();
                let route = {
                    let mut state = worker_state.lock().unwrap();
                    *state.hits.entry(path.clone()).or_default() += 1;
                    state.routes.get(&path).cloned()
                };
                // каждый запрос в своём потоке, чтобы медленные ответы не блокировали остальные
                thread::spawn(move || {
                    let route = route.unwrap_or_else(|| Route::status(404, "not found"));
                    thread::sleep(route.delay);
                    let mut headers = Vec::new();
                    if let Some(location) = &route.location {
                        headers.push(Header::from_bytes("Location", location.as_bytes()).unwrap());
                    }
                    let len = route.body.len();
                    let _ = match route.trickle {
                        Some(pause) => request.respond(Response::new(
                            StatusCode(route.status),
                            headers,
                            Trickle {
                                data: io::Cursor::new(route.body),
                                pause,
                            },
                            Some(len),
                            None,
                        )),
                        None => request.respond(Response::new(
                            StatusCode(route.status),
                            headers,
                            io::Cursor::new(route.body),
                            Some(len),
                            None,
                        )),
                    };
                });
            }
        });

        Self {
            server,
            port,
            state,
        }
    }

    pub fn route(&self, path: &str, route: Route) {
        self.state
            .lock()
            .unwrap()
            .routes
            .insert(path.to_string(), route);
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .hits
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
    }
}

/// Собрать `.tgz` в формате реестра: все файлы под `package/`.
pub fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("package/{}", path), content.as_bytes())
            .unwrap();
    }
    let mut encoder = builder.into_inner().unwrap();
    encoder.flush().unwrap();
    encoder.finish().unwrap()
}

/// Значение `integrity` для данных.
pub fn sha512_integrity(data: &[u8]) -> String {
    format!("sha512-{}", BASE64.encode(Sha512::digest(data)))
}
