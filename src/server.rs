use std::{
    fs, io,
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
    sync::Arc,
    thread,
};

use log::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::http::{read_body, read_head, Method, Request, Response, MAX_HEAD_SIZE};
use crate::router::{route, Route, Router};
use crate::upload::BodyLimit;

pub struct Server {
    listener: TcpListener,
    router: Arc<Router>,
}

impl Server {
    /// Creates the upload directory and binds the configured address.
    pub fn bind(config: ServerConfig) -> io::Result<Server> {
        fs::create_dir_all(&config.upload_dir)?;
        let listener = TcpListener::bind(config.bind_address())?;
        Ok(Server::from_listener(listener, config))
    }

    pub fn from_listener(listener: TcpListener, config: ServerConfig) -> Server {
        Server {
            listener,
            router: Arc::new(Router::new(config)),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever, one thread each.
    pub fn run(self) {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let router = Arc::clone(&self.router);
                    thread::spawn(move || handle_connection(stream, &router));
                }
                Err(e) => error!("failed to accept connection: {}", e),
            }
        }
    }
}

/// Serves exactly one request on `stream`, then closes it.
pub fn handle_connection(mut stream: TcpStream, router: &Router) {
    if let Err(e) = stream.set_read_timeout(Some(router.config().read_timeout)) {
        warn!("could not set read timeout: {}", e);
    }

    let (request, outcome) = match read_request(&mut stream, router) {
        Ok(request) => {
            let response = router.handle(&request);
            (Some(request), Ok(response))
        }
        Err((request, e)) => (request, Err(e)),
    };

    let response = match outcome {
        Ok(response) => response,
        Err(e) => {
            if let ServerError::PayloadTooLarge { .. } = e {
                warn!("aborting upload: {}", e);
            } else {
                debug!("rejected request: {}", e);
            }
            Response::from_error(&e)
        }
    };

    let include_body = request
        .as_ref()
        .map(|r| r.method != Method::Head)
        .unwrap_or(true);
    match &request {
        Some(r) => info!("{} {} -> {}", r.method, r.target, response.status),
        None => info!("unparsed request -> {}", response.status),
    }

    if let Err(e) = response.write_to(&mut stream, include_body) {
        error!("failed to write response: {}", e);
    }
    if let Err(e) = stream.shutdown(Shutdown::Both) {
        debug!("shutdown after response: {}", e);
    }
}

/// Reads the head and, for uploads only, the size-guarded body.
fn read_request(
    stream: &mut TcpStream,
    router: &Router,
) -> Result<Request, (Option<Request>, ServerError)> {
    let (mut request, leftover) = read_head(stream, MAX_HEAD_SIZE).map_err(|e| (None, e))?;

    if route(&request.method, request.path()) != Route::Upload {
        return Ok(request);
    }

    let checked = router
        .upload_boundary(&request)
        .and_then(|_| request.content_length())
        .and_then(|length| {
            length.ok_or_else(|| ServerError::BadRequest(String::from("missing Content-Length")))
        });
    let content_length = match checked {
        Ok(length) => length,
        Err(e) => return Err((Some(request), e)),
    };

    let mut limit = BodyLimit::new(router.config().max_upload_size);
    match read_body(stream, leftover, content_length, &mut limit) {
        Ok(body) => {
            request.body = body;
            Ok(request)
        }
        Err(e) => Err((Some(request), e)),
    }
}
