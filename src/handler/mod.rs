//! Turns a parsed [`Request`] into a [`Response`].
//!
//! ```text
//! Request ─► validate (405 / 505 / 413 / 400)
//!         ─► configured redirect
//!         ─► GET | POST | DELETE      ─► Outcome
//!         ─► assemble: listing page, custom or generated error/redirect
//!            page, or content dispatch (CGI → MIME → unsupported)
//! ```

pub mod cgi;
pub mod methods;
pub mod pages;
pub mod target;
pub mod validate;

use std::ops::ControlFlow;
use std::path::PathBuf;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::config::{Route, VirtualHost};
use crate::http::mime;
use crate::http::request::{Method, Request};
use crate::http::response::{Body, Response, StatusCode};

use self::target::Target;
use self::validate::Context;

/// What a method handler produced, before it is turned into bytes.
#[derive(Debug)]
pub enum Outcome {
    /// Serve this file (or run it, if its extension maps to CGI).
    File(PathBuf),
    /// Directory to render as an autoindex page.
    Listing(PathBuf),
    /// A generated page with its status.
    Page(StatusCode, String),
    Redirect(StatusCode, String),
    Failed(StatusCode),
}

pub struct ResponseBuilder<'a> {
    host: &'a VirtualHost,
    request: &'a Request,
    target: Option<Target>,
}

impl<'a> ResponseBuilder<'a> {
    pub fn new(host: &'a VirtualHost, request: &'a Request) -> Self {
        Self {
            host,
            request,
            target: Target::parse(&request.path),
        }
    }

    fn route(&self) -> Route<'a> {
        let path = self
            .target
            .as_ref()
            .map_or(self.request.path.as_str(), |t| t.path());
        self.host.route(path)
    }

    pub async fn build(self) -> Response {
        let outcome = self.process().await;
        debug!(?outcome, path = %self.request.path, "Request processed");
        self.assemble(outcome).await
    }

    async fn process(&self) -> Outcome {
        let route = self.route();
        let ctx = Context {
            request: self.request,
            route,
            target: self.target.as_ref(),
        };
        if let ControlFlow::Break(status) = validate::validate(&ctx) {
            return Outcome::Failed(status);
        }
        let Some(target) = &self.target else {
            return Outcome::Failed(StatusCode::BAD_REQUEST);
        };

        if let Some(redirect) = route.redirect() {
            return Outcome::Redirect(
                StatusCode::from_u16(redirect.status),
                redirect.target.clone(),
            );
        }

        let path = target.under(route.root());
        let result = match self.request.known_method() {
            Some(Method::Get) => methods::get(&route, &path).await,
            Some(Method::Post) => methods::post(&route, &path, target.path(), self.request).await,
            Some(Method::Delete) => methods::delete(&path, target.path()).await,
            None => Err(StatusCode::METHOD_NOT_ALLOWED),
        };
        result.unwrap_or_else(Outcome::Failed)
    }

    async fn assemble(&self, outcome: Outcome) -> Response {
        let mut response = Response::new(self.request);

        match outcome {
            Outcome::Listing(dir) => {
                let url_path = self.target.as_ref().map_or("/", |t| t.path());
                match pages::autoindex(&dir, url_path).await {
                    Ok(html) => {
                        response.path = dir;
                        response.body = Body::Memory(Bytes::from(html));
                    }
                    Err(e) => {
                        warn!(dir = %dir.display(), error = %e, "Failed to list directory");
                        status_page(self.host, &mut response, methods::status_for(&e));
                    }
                }
            }
            Outcome::File(path) => self.serve(&mut response, path).await,
            Outcome::Page(status, html) => {
                response.status = status;
                response.body = Body::Memory(Bytes::from(html));
            }
            Outcome::Redirect(status, target) => {
                response.location = Some(target);
                status_page(self.host, &mut response, status);
            }
            Outcome::Failed(status) => status_page(self.host, &mut response, status),
        }

        response
    }

    /// Content dispatch: CGI first, then the MIME table.
    async fn serve(&self, response: &mut Response, path: PathBuf) {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let route = self.route();

        if let (Some(interpreter), Some(target)) = (route.cgi_interpreter(ext), &self.target) {
            let script = cgi::Script {
                interpreter,
                path: &path,
                request: self.request,
                target,
                host: self.host,
            };
            let result = script.run().await;
            match result {
                Ok(output) => {
                    response.content_type = mime::HTML;
                    response.body = Body::Transient(output);
                    response.path = path;
                }
                Err(e) => {
                    warn!(script = %path.display(), error = %e, "CGI failed");
                    status_page(self.host, response, StatusCode::INTERNAL_SERVER_ERROR);
                }
            }
            return;
        }

        match mime::content_type(&path) {
            Some(content_type) => {
                response.content_type = content_type;
                response.body = Body::File(path.clone());
            }
            None => {
                warn!(path = %path.display(), extension = ext, "Extension not supported, no response sent");
                response.body = Body::Unsupported;
            }
        }
        response.path = path;
    }
}

/// A response for a request that never reached the pipeline, such as one
/// that failed to parse.
pub fn rejection(host: &VirtualHost, status: StatusCode) -> Response {
    let mut response = Response::page(status, Bytes::new());
    status_page(host, &mut response, status);
    response
}

/// Error and redirect statuses: the host's custom page when one is
/// configured and readable, a generated page otherwise.
fn status_page(host: &VirtualHost, response: &mut Response, status: StatusCode) {
    response.status = status;

    if let Some(page) = host.error_page(status.as_u16()) {
        if page.is_file() {
            response.body = match mime::content_type(&page) {
                Some(content_type) => {
                    response.content_type = content_type;
                    Body::File(page.clone())
                }
                None => Body::Unsupported,
            };
            response.path = page;
            return;
        }
        warn!(page = %page.display(), status = status.as_u16(), "Custom error page missing, using generated page");
    }

    response.content_type = mime::HTML;
    let html = if status.is_error() {
        pages::error(status)
    } else {
        pages::redirect(status, response.location.as_deref())
    };
    response.body = Body::Memory(Bytes::from(html));
}
