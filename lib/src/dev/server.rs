use std::net::{SocketAddr, ToSocketAddrs};

use tiny_http::{Header, Method, Request, Server, StatusCode};

use crate::error::{Chainable, Result};
use super::{Orchestrator, Response};

/// How many consecutive ports to try when the configured one is taken.
pub const MAX_PORT_RETRIES: u16 = 10;

/// A bound dev server.
pub struct Bound {
    pub server: Server,
    pub addr: SocketAddr,
}

/// Binds `host:port`, moving on to the following ports while they are in
/// use.
pub fn bind(host: &str, port: u16) -> Result<Bound> {
    let mut last_error = None;
    for offset in 0..MAX_PORT_RETRIES {
        let port = port.saturating_add(offset);
        let addr = (host, port).to_socket_addrs()
            .chain_with(|| error!("invalid dev server address", "host" => host, "port" => port))?
            .next()
            .ok_or_else(|| error!("dev server host did not resolve", "host" => host))?;

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log::warn!(target: "wren::dev", "port {} in use, using {} instead", port - offset, port);
                }

                return Ok(Bound { server, addr });
            }
            Err(e) => last_error = Some(e),
        }
    }

    let error = error! {
        "failed to bind the dev server",
        "host" => host,
        "ports" => format!("{}-{}", port, port.saturating_add(MAX_PORT_RETRIES - 1)),
    };

    match last_error {
        Some(e) => Err(crate::error::Error::from(e).chain(error)),
        None => Err(error),
    }
}

/// Answers requests until the server is unblocked. Each request is handled
/// to completion on this thread.
pub fn serve(orchestrator: &Orchestrator, bound: Bound) {
    log::info!(target: "wren::dev", "serving at http://{}", bound.addr);
    for request in bound.server.incoming_requests() {
        respond(orchestrator, request);
    }
}

fn respond(orchestrator: &Orchestrator, request: Request) {
    let response = match request.method() {
        Method::Get | Method::Head => orchestrator.handle(request.url()),
        _ => Response::method_not_allowed(),
    };

    log::debug!(target: "wren::dev", "{} {} -> {}", request.method(), request.url(), response.status);

    let mut http = tiny_http::Response::from_data(response.body)
        .with_status_code(StatusCode(response.status));

    for (name, value) in &response.headers {
        match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(header) => http.add_header(header),
            Err(()) => log::warn!(target: "wren::dev", "dropping invalid header {name}"),
        }
    }

    if let Err(e) = request.respond(http) {
        log::warn!(target: "wren::dev", "failed to send response: {e}");
    }
}
