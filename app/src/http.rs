use std::error::Error;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Instant;

use json::object;
use log::{debug, error, warn};
use tiny_http::{Header, Request, Response};

use crate::router::{Responder, TriggerRouter, ACKNOWLEDGEMENT};
use crate::verify::Credential;
use crate::{LockState, State};

const HTML: &str = include_str!("home.html");

#[derive(Clone)]
struct Headers {
    json: Header,
    html: Header,
}

impl Headers {
    fn new() -> Result<Headers, Box<dyn Error + Send + Sync + 'static>> {
        let parse = |raw: &str| {
            raw.parse::<Header>()
                .map_err(|()| format!("invalid header {:?}", raw))
        };
        Ok(Headers {
            json: parse("Content-type: application/json; charset=utf-8")?,
            html: parse("Content-type: text/html; charset=utf-8")?,
        })
    }
}

pub struct Server {
    server: tiny_http::Server,
    headers: Headers,
    remote_token: Option<String>,
}

impl Server {
    /// `remote_token` enables `/blynk/v0`; writes must carry it as the `token` field.
    pub fn new<A>(
        addr: A,
        remote_token: Option<String>,
    ) -> Result<Server, Box<dyn Error + Send + Sync + 'static>>
    where
        A: ToSocketAddrs,
    {
        Ok(Server {
            server: tiny_http::Server::http(addr)?,
            headers: Headers::new()?,
            remote_token,
        })
    }

    /// The bound address; useful when listening on port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    pub fn handle_requests(&self, router: Arc<TriggerRouter>, state: Arc<RwLock<State>>) {
        for request in self.server.incoming_requests() {
            let url = request.url().to_owned();
            let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));
            debug!("{} {}", request.method(), path);

            // Gated routes wait on the verification authority (and, for repeats, on
            // the poll interval), so each gets its own thread.
            match path {
                "/lock" => {
                    let router = Arc::clone(&router);
                    let responder = HttpResponder::new(request, self.headers.clone());
                    let credential = Credential::from_query(query);
                    thread::spawn(move || router.network_toggle(credential, responder));
                    continue;
                }
                "/lock-repeats" => {
                    let router = Arc::clone(&router);
                    let responder = HttpResponder::new(request, self.headers.clone());
                    let credential = Credential::from_query(query);
                    thread::spawn(move || router.network_repeated(credential, responder));
                    continue;
                }
                _ => {}
            }

            let response = match path {
                "/" => {
                    let current_state = match state.read() {
                        Ok(current) => *current,
                        Err(_) => {
                            error!("status lock poisoned");
                            continue;
                        }
                    };
                    let status = match current_state.lock_state {
                        LockState::Locked => "🔒 Locked",
                        LockState::Unlocked => "🔓 Unlocked",
                    };
                    let since = current_state
                        .changed_at
                        .map(|changed| {
                            let formatter = timeago::Formatter::new();
                            format!("since {}", formatter.convert(changed.elapsed()))
                        })
                        .unwrap_or_else(|| String::from("since startup"));
                    let html = HTML.replace("$lockstate$", &format!("{} {}", status, since));
                    Response::from_string(html).with_header(self.headers.html.clone())
                }
                "/lock.json" => {
                    let now = Instant::now();
                    let current_state = match state.read() {
                        Ok(current) => *current,
                        Err(_) => {
                            error!("status lock poisoned");
                            continue;
                        }
                    };
                    let obj = object! {
                        state: current_state.lock_state.to_string(),
                        changed_for: current_state.changed_at.map(|changed| now.duration_since(changed).as_secs()),
                        toggles: current_state.toggles
                    };
                    let body = json::stringify_pretty(obj, 2);
                    Response::from_string(body).with_header(self.headers.json.clone())
                }
                "/url" => Response::from_string(acknowledgement_body())
                    .with_header(self.headers.json.clone()),
                "/blynk/v0" if self.remote_token.is_some() => {
                    let fields = Credential::from_query(query);
                    if fields.get("token") == self.remote_token.as_deref() {
                        router.remote_write(fields.get("value").unwrap_or(""));
                        Response::from_string("OK")
                    } else {
                        warn!("remote write rejected: missing or wrong token");
                        Response::from_string("Forbidden").with_status_code(403)
                    }
                }
                _ => Response::from_string("Not found").with_status_code(404),
            };

            // Ignoring I/O errors that occur here so that we don't take down the process if there
            // is an issue sending the response.
            let _ = request.respond(response);
        }
    }

    pub fn shutdown(&self) {
        self.server.unblock();
    }
}

fn acknowledgement_body() -> String {
    json::stringify(ACKNOWLEDGEMENT.to_vec())
}

/// Answers a gated request. Dropped unanswered, tiny_http closes it with an empty 500.
pub struct HttpResponder {
    request: Request,
    headers: Headers,
}

impl HttpResponder {
    fn new(request: Request, headers: Headers) -> Self {
        HttpResponder { request, headers }
    }
}

impl Responder for HttpResponder {
    fn acknowledge(self) {
        let response =
            Response::from_string(acknowledgement_body()).with_header(self.headers.json);
        if let Err(err) = self.request.respond(response) {
            warn!("unable to acknowledge request: {}", err);
        }
    }

    fn reject(self, err: &crate::Error) {
        let body = json::stringify(object! { error: err.to_string() });
        let response = Response::from_string(body)
            .with_status_code(502)
            .with_header(self.headers.json);
        if let Err(err) = self.request.respond(response) {
            warn!("unable to send error response: {}", err);
        }
    }
}
