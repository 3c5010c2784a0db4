//! Checks every request passes before the filesystem is touched.

use std::ops::ControlFlow;

use crate::config::Route;
use crate::handler::target::Target;
use crate::http::request::{Request, SUPPORTED_VERSION};
use crate::http::response::StatusCode;

pub struct Context<'a> {
    pub request: &'a Request,
    pub route: Route<'a>,
    pub target: Option<&'a Target>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    LimitExcept,
    Version,
    BodySize,
    Containment,
}

/// Evaluation order; the first check that breaks decides the status.
pub const CHAIN: [Check; 4] = [
    Check::LimitExcept,
    Check::Version,
    Check::BodySize,
    Check::Containment,
];

impl Check {
    pub fn run(self, ctx: &Context<'_>) -> ControlFlow<StatusCode> {
        let pass = match self {
            Check::LimitExcept => ctx.route.allows(&ctx.request.method),
            Check::Version => ctx.request.version == SUPPORTED_VERSION,
            Check::BodySize => ctx.request.body_size as u64 <= ctx.route.body_limit(),
            Check::Containment => ctx.target.is_some(),
        };
        if pass {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(self.status())
        }
    }

    fn status(self) -> StatusCode {
        match self {
            Check::LimitExcept => StatusCode::METHOD_NOT_ALLOWED,
            Check::Version => StatusCode::VERSION_NOT_SUPPORTED,
            Check::BodySize => StatusCode::PAYLOAD_TOO_LARGE,
            Check::Containment => StatusCode::BAD_REQUEST,
        }
    }
}

pub fn validate(ctx: &Context<'_>) -> ControlFlow<StatusCode> {
    CHAIN.iter().try_for_each(|check| check.run(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Location, VirtualHost};
    use crate::http::request::RequestBuilder;

    fn host_with_limits(limits: &[&str]) -> VirtualHost {
        let mut location = Location::new("/");
        location.limit_except = limits.iter().map(|m| m.to_string()).collect();
        location.client_max_body_size = Some(1);
        VirtualHost {
            locations: vec![location],
            ..VirtualHost::default()
        }
    }

    fn check(host: &VirtualHost, request: &Request) -> ControlFlow<StatusCode> {
        let target = Target::parse(&request.path);
        let ctx = Context {
            request,
            route: host.route(target.as_ref().map_or(request.path.as_str(), |t| t.path())),
            target: target.as_ref(),
        };
        validate(&ctx)
    }

    fn request(method: &str, path: &str) -> Request {
        RequestBuilder::new().method(method).path(path).build().unwrap()
    }

    #[test]
    fn limit_except_rejects_other_methods() {
        let host = host_with_limits(&["GET"]);
        assert_eq!(
            check(&host, &request("POST", "/")),
            ControlFlow::Break(StatusCode::METHOD_NOT_ALLOWED)
        );
        assert_eq!(check(&host, &request("GET", "/")), ControlFlow::Continue(()));
    }

    #[test]
    fn empty_limit_except_allows_everything() {
        let host = host_with_limits(&[]);
        for method in ["GET", "POST", "DELETE", "BREW"] {
            assert_eq!(check(&host, &request(method, "/")), ControlFlow::Continue(()));
        }
    }

    #[test]
    fn version_is_checked_after_methods() {
        let host = host_with_limits(&["GET"]);
        let mut req = request("GET", "/");
        req.version = "HTTP/1.0".to_string();
        assert_eq!(
            check(&host, &req),
            ControlFlow::Break(StatusCode::VERSION_NOT_SUPPORTED)
        );

        req.method = "POST".to_string();
        assert_eq!(
            check(&host, &req),
            ControlFlow::Break(StatusCode::METHOD_NOT_ALLOWED)
        );
    }

    #[test]
    fn body_limit_is_in_mebibytes() {
        let host = host_with_limits(&[]);
        let mut req = request("POST", "/upload");
        req.body_size = 1024 * 1024;
        assert_eq!(check(&host, &req), ControlFlow::Continue(()));

        req.body_size += 1;
        assert_eq!(
            check(&host, &req),
            ControlFlow::Break(StatusCode::PAYLOAD_TOO_LARGE)
        );
    }

    #[test]
    fn escaping_paths_are_bad_requests() {
        let host = host_with_limits(&[]);
        assert_eq!(
            check(&host, &request("GET", "/..%2F..%2Fetc/passwd")),
            ControlFlow::Break(StatusCode::BAD_REQUEST)
        );
    }
}
