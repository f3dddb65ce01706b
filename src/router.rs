//! Simple router for registering and matching request handlers.
//!
//! Routes match on the exact request path (query string ignored) and the
//! HTTP method. A path that is registered for some other method yields
//! `405 Method Not Allowed`; an unregistered path yields `404 Not Found`.
//!
//! Handlers are stored as boxed closures capturing any required state. The
//! router is built once at startup and shared by every worker thread.

use crate::error::AppError;
use crate::http::{Request, Response};
use log::{debug, trace};

/// Type alias for a request handler closure.
pub type Handler = Box<dyn Fn(&Request) -> Result<Response, AppError> + Send + Sync + 'static>;

struct RouteEntry {
    method: String,
    path: String,
    handler: Handler,
}

/// A minimal router storing registered routes and resolving them for incoming requests.
#[derive(Default)]
pub struct Router {
    routes: Vec<RouteEntry>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an exact path match for the given HTTP method.
    pub fn register_exact<M, P>(&mut self, method: M, path: P, handler: Handler)
    where
        M: Into<String>,
        P: Into<String>,
    {
        self.routes.push(RouteEntry {
            method: method.into().to_uppercase(),
            path: path.into(),
            handler,
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Resolve a request and run the matching handler.
    pub fn route(&self, request: &Request) -> Result<Response, AppError> {
        debug!("Routing request: {} {}", request.method, request.path);
        trace!("Available routes: {}", self.routes.len());

        let method = request.method.to_uppercase();
        let path = request.path();
        let mut path_known = false;

        for entry in self.routes.iter().filter(|entry| entry.path == path) {
            if entry.method == method {
                debug!("Route matched: {} {}", entry.method, entry.path);
                return (entry.handler)(request);
            }
            path_known = true;
        }

        if path_known {
            debug!("Method {method} not allowed for {path}");
            Err(AppError::MethodNotAllowed)
        } else {
            debug!("No route matched for: {} {}", request.method, path);
            Err(AppError::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ResponseBody;
    use std::collections::HashMap;

    fn dummy_request(method: &str, path: &str) -> Request {
        Request {
            method: method.to_string(),
            path: path.to_string(),
            headers: HashMap::new(),
            body: None,
        }
    }

    fn echo_router() -> Router {
        let mut router = Router::new();
        router.register_exact(
            "GET",
            "/search",
            Box::new(|r| {
                Ok(Response::new(
                    200,
                    "OK",
                    ResponseBody::Text(r.query().unwrap_or("").to_string()),
                ))
            }),
        );
        router.register_exact(
            "post",
            "/delete",
            Box::new(|_| Ok(Response::redirect("/"))),
        );
        router
    }

    #[test]
    fn test_exact_route_matching() {
        let router = echo_router();
        assert_eq!(router.len(), 2);
        let resp = router.route(&dummy_request("POST", "/delete")).unwrap();
        assert_eq!(resp.status_code, 302);
    }

    #[test]
    fn test_querystring_is_ignored_in_matching() {
        let router = echo_router();
        let resp = router
            .route(&dummy_request("GET", "/search?query=ada"))
            .unwrap();
        assert_eq!(resp.body_bytes(), b"query=ada");
    }

    #[test]
    fn test_wrong_method_is_405() {
        let router = echo_router();
        let err = router.route(&dummy_request("GET", "/delete")).unwrap_err();
        assert!(matches!(err, AppError::MethodNotAllowed));
    }

    #[test]
    fn test_unknown_path_is_404() {
        let router = echo_router();
        let err = router.route(&dummy_request("GET", "/missing")).unwrap_err();
        assert!(matches!(err, AppError::NotFound));
        // No prefix matching
        let err = router
            .route(&dummy_request("GET", "/search/more"))
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }
}
