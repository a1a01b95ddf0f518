// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Route registration and serving.

use crate::lifecycle::Lifecycle;
use crate::rest::middleware;
use axum::Router;
use axum::extract::Request;
use axum::handler::Handler;
use axum::http::Method;
use axum::response::IntoResponse;
use axum::routing::{MethodFilter, MethodRouter, any, get, on};
use log::{debug, info};
use std::cmp::Reverse;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::{Layer, Service};

/// Function that wraps a single route with a middleware.
type RouteWrapper = dyn Fn(MethodRouter) -> MethodRouter + Send + Sync;

/// Function that wraps a whole router with a middleware.
type RouterWrapper = dyn Fn(Router) -> Router + Send + Sync;

/// A tower layer that can wrap either individual routes or whole routers.
#[derive(Clone)]
pub struct Middleware {
    /// Applies the layer to one route.
    on_route: Arc<RouteWrapper>,

    /// Applies the layer to all routes of a router.
    on_router: Arc<RouterWrapper>,
}

impl Middleware {
    /// Creates a middleware from a tower `layer`.
    pub fn from_layer<L>(layer: L) -> Self
    where
        L: Layer<axum::routing::Route> + Clone + Send + Sync + 'static,
        L::Service: Service<Request> + Clone + Send + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        let route_layer = layer.clone();
        let on_route =
            move |route: MethodRouter| -> MethodRouter { route.layer(route_layer.clone()) };
        let on_router = move |router: Router| -> Router { router.layer(layer.clone()) };
        Self { on_route: Arc::new(on_route), on_router: Arc::new(on_router) }
    }

    /// Wraps all the routes currently registered in `router`.
    pub fn apply(&self, router: Router) -> Router {
        (self.on_router)(router)
    }

    /// Wraps a single `route`.
    fn apply_route(&self, route: MethodRouter) -> MethodRouter {
        (self.on_route)(route)
    }
}

/// Builds a method router that dispatches `methods` to `handler`, or all methods if empty.
fn method_router<H, T, S>(methods: &[Method], handler: H) -> Result<MethodRouter<S>, String>
where
    H: Handler<T, S>,
    T: 'static,
    S: Clone + Send + Sync + 'static,
{
    let mut filter: Option<MethodFilter> = None;
    for method in methods {
        let one = MethodFilter::try_from(method.clone())
            .map_err(|e| format!("Cannot route method {}: {}", method, e))?;
        filter = Some(match filter {
            Some(filter) => filter.or(one),
            None => one,
        });
    }
    Ok(match filter {
        Some(filter) => on(filter, handler),
        None => any(handler),
    })
}

/// A single HTTP route: a path, the methods it accepts and its handler.
pub struct Route {
    /// Path pattern.  Parameters can be written as `:name` or `{name}`.
    pub path: String,

    /// Methods accepted by the route.  Empty means any method.
    pub methods: Vec<Method>,

    /// The handler for the route, with its state already attached.
    pub handler: MethodRouter,

    /// Middlewares that wrap this route only.  The first one is the outermost.
    pub middlewares: Vec<Middleware>,
}

impl Route {
    /// Creates a route for a stateless `handler`.
    pub fn new<H, T>(path: &str, methods: &[Method], handler: H) -> Result<Self, String>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Ok(Self {
            path: path.to_owned(),
            methods: methods.to_vec(),
            handler: method_router(methods, handler)?,
            middlewares: vec![],
        })
    }

    /// Creates a route for a `handler` that needs `state`.
    pub fn with_state<H, T, S>(
        path: &str,
        methods: &[Method],
        handler: H,
        state: S,
    ) -> Result<Self, String>
    where
        H: Handler<T, S>,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        Ok(Self {
            path: path.to_owned(),
            methods: methods.to_vec(),
            handler: method_router(methods, handler)?.with_state(state),
            middlewares: vec![],
        })
    }

    /// Appends a middleware that wraps only this route.
    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }
}

/// Returns true if the path `segment` is a parameter.
fn is_param(segment: &str) -> bool {
    segment.starts_with(':') || (segment.starts_with('{') && segment.ends_with('}'))
}

/// Splits `path` into its non-empty segments.  `/` has no segments.
fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Sorts `routes` so that the most specific ones come first: routes with more segments go
/// before routes with fewer, and literal segments go before parameters at the first position
/// where they differ.  The sort is stable.
fn sort_routes(routes: &mut [Route]) {
    routes.sort_by_cached_key(|route| {
        let params = segments(&route.path).map(is_param).collect::<Vec<bool>>();
        (Reverse(params.len()), params)
    });
}

/// Converts `{name}` parameters in `path` to the `:name` syntax used by axum.
fn axum_path(path: &str) -> String {
    let converted = path
        .split('/')
        .map(|segment| {
            if segment.starts_with('{') && segment.ends_with('}') && segment.len() > 2 {
                format!(":{}", &segment[1..segment.len() - 1])
            } else {
                segment.to_owned()
            }
        })
        .collect::<Vec<String>>()
        .join("/");
    if converted.is_empty() { "/".to_owned() } else { converted }
}

/// Creates a router with all `routes` and wraps them with the `global_middlewares`.
///
/// Route middlewares run inside global middlewares.  In both lists, the first middleware is the
/// outermost one.  Panics in handlers are always caught and turned into internal errors.
pub fn build_router(mut routes: Vec<Route>, global_middlewares: &[Middleware]) -> Router {
    sort_routes(&mut routes);

    let mut router = Router::new();
    for route in routes {
        let path = axum_path(&route.path);
        debug!("Registering route {} {:?}", path, route.methods);

        let mut handler = route.handler;
        for middleware in route.middlewares.iter().rev() {
            handler = middleware.apply_route(handler);
        }
        router = router.route(&path, handler);
    }

    for middleware in global_middlewares.iter().rev() {
        router = middleware.apply(router);
    }
    middleware::catch_panic().apply(router)
}

/// Creates a router that answers `GET path` with `OK` for health checks.
pub fn health_router(path: &str) -> Router {
    Router::new().route(path, get(|| async { "OK" }))
}

/// Serves `router` on `addr` until `lifecycle` is stopped.
///
/// Once the lifecycle stops, in-flight requests get up to the lifecycle's stop timeout to finish.
pub async fn serve(addr: SocketAddr, router: Router, lifecycle: &Lifecycle) -> io::Result<()> {
    let handle = axum_server::Handle::new();

    let mut shutdown = lifecycle.shutdown();
    let stop_timeout = lifecycle.stop_timeout();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown.wait().await;
        info!("Shutting down HTTP server");
        shutdown_handle.graceful_shutdown(Some(stop_timeout));
    });

    info!("Listening on {}", addr);
    axum_server::bind(addr).handle(handle).serve(router.into_make_service()).await
}
