use std::collections::HashSet;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::rejection::RawPathParamsRejection;
use axum::extract::{RawPathParams, Request};
use axum::http::Method;
use axum::routing::{MethodFilter, MethodRouter, get, on};
use ferrule_core::config::Config;
use ferrule_core::metrics::MetricsRecorder;
use ferrule_core::rate_limit::{AdmissionGate, RateLimiter};
use ferrule_core::sink::{NotifySink, RecordSink};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tracing::{Span, info, warn};

use crate::handler::Handler;
use crate::handler::health::{self, Health};
use crate::middleware::{Pipeline, Route, TRACE_EXEMPT_PATHS, panic};
use crate::pool::ContextPool;

/// Assembles an [`Engine`] from configuration plus the pluggable parts:
/// observability sinks, an admission gate and the optional system routers.
pub struct EngineBuilder {
    config: Config,
    notify: Option<Arc<dyn NotifySink>>,
    record: Option<Arc<dyn RecordSink>>,
    gate: Option<Arc<dyn AdmissionGate>>,
    logger: Span,
    metrics_exposition: Option<MethodRouter>,
    profiling: Option<Router>,
    api_docs: Option<Router>,
}

impl EngineBuilder {
    pub fn alert_sink(mut self, sink: impl NotifySink + 'static) -> Self {
        self.notify = Some(Arc::new(sink));
        self
    }

    pub fn record_sink(mut self, sink: impl RecordSink + 'static) -> Self {
        self.record = Some(Arc::new(sink));
        self
    }

    /// Records into `recorder` and exposes its snapshot at `/metrics` when
    /// `enable-metrics` is set.
    pub fn metrics_recorder(mut self, recorder: Arc<MetricsRecorder>) -> Self {
        self.record = Some(recorder.clone());
        self.metrics_exposition = Some(get(move || {
            let recorder = Arc::clone(&recorder);
            async move { Json(recorder.snapshot()) }
        }));
        self
    }

    /// Replaces the default `/metrics` route.
    pub fn metrics_exposition(mut self, route: MethodRouter) -> Self {
        self.metrics_exposition = Some(route);
        self
    }

    /// Overrides the gate built from `rate-limit`.
    pub fn admission_gate(mut self, gate: Arc<dyn AdmissionGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Parent span of every request span.
    pub fn logger(mut self, logger: Span) -> Self {
        self.logger = logger;
        self
    }

    /// Mounted under `/debug/pprof` when `enable-pprof` is set.
    pub fn profiling(mut self, router: Router) -> Self {
        self.profiling = Some(router);
        self
    }

    /// Mounted under `/swagger` when `enable-swagger` is set.
    pub fn api_docs(mut self, router: Router) -> Self {
        self.api_docs = Some(router);
        self
    }

    pub fn build(self) -> Engine {
        panic::install_hook();

        let config = self.config;
        let gate = self.gate.or_else(|| {
            RateLimiter::from_config(&config.rate_limit).map(|limiter| {
                info!(max_requests_per_second = limiter.limit(), "rate limit enabled");
                Arc::new(limiter) as Arc<dyn AdmissionGate>
            })
        });
        let pipeline = Arc::new(Pipeline {
            project_name: config.project_name.clone(),
            env: config.env,
            pool: ContextPool::new(config.max_idle_contexts),
            trace_exempt: TRACE_EXEMPT_PATHS.iter().map(|p| p.to_string()).collect::<HashSet<_>>(),
            gate,
            notify: self.notify,
            record: self.record,
            logger: self.logger,
            body_limit: config.body_limit_bytes(),
        });

        let mut engine = Engine {
            pipeline,
            router: Router::new(),
            metrics_exposition: self.metrics_exposition,
            profiling: self.profiling,
            api_docs: self.api_docs,
            config,
        };
        let env = engine.config.env;
        engine.get("/system/health", Health::new(env));
        engine
    }
}

/// Route table whose every route runs through one shared [`Pipeline`].
pub struct Engine {
    pipeline: Arc<Pipeline>,
    router: Router,
    config: Config,
    metrics_exposition: Option<MethodRouter>,
    profiling: Option<Router>,
    api_docs: Option<Router>,
}

impl Engine {
    pub fn builder(config: Config) -> EngineBuilder {
        EngineBuilder {
            config,
            notify: None,
            record: None,
            gate: None,
            logger: Span::none(),
            metrics_exposition: None,
            profiling: None,
            api_docs: None,
        }
    }

    pub fn pipeline(&self) -> Arc<Pipeline> {
        Arc::clone(&self.pipeline)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn handle(&mut self, method: MethodFilter, path: &str, handler: impl Handler) -> &mut Self {
        self.register(method, path, None, Arc::new(handler))
    }

    /// Like [`handle`](Self::handle), reporting metrics under `alias` instead
    /// of the concrete path, e.g. `/users/{id}` rather than `/users/42`.
    pub fn handle_with_alias(
        &mut self,
        method: MethodFilter,
        path: &str,
        alias: &str,
        handler: impl Handler,
    ) -> &mut Self {
        self.register(method, path, Some(alias), Arc::new(handler))
    }

    pub fn get(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.handle(MethodFilter::GET, path, handler)
    }

    pub fn post(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.handle(MethodFilter::POST, path, handler)
    }

    pub fn put(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.handle(MethodFilter::PUT, path, handler)
    }

    pub fn patch(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.handle(MethodFilter::PATCH, path, handler)
    }

    pub fn delete(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.handle(MethodFilter::DELETE, path, handler)
    }

    /// Registers routes under a common path prefix.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group {
            engine: self,
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    fn register(
        &mut self,
        method: MethodFilter,
        path: &str,
        alias: Option<&str>,
        handler: Arc<dyn Handler>,
    ) -> &mut Self {
        let route = Arc::new(Route {
            handler,
            alias: alias.map(str::to_string),
        });
        let pipeline = Arc::clone(&self.pipeline);
        let endpoint = move |params: Result<RawPathParams, RawPathParamsRejection>,
                             request: Request| {
            let pipeline = Arc::clone(&pipeline);
            let route = Arc::clone(&route);
            async move {
                let params = params
                    .map(|raw| {
                        raw.iter()
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                pipeline.dispatch(route, request, params).await
            }
        };
        self.router = std::mem::take(&mut self.router).route(path, on(method, endpoint));
        self
    }

    /// Final router: registered routes, the enabled system endpoints, the
    /// 404 fallback and CORS.
    pub fn into_router(self) -> Router {
        let mut router = self.router;

        if self.config.enable_metrics {
            match self.metrics_exposition {
                Some(route) => router = router.route("/metrics", route),
                None => warn!("enable-metrics is set but no metrics exposition is configured"),
            }
        }
        if self.config.enable_pprof {
            match self.profiling {
                Some(profiling) => router = router.nest("/debug/pprof", profiling),
                None => warn!("enable-pprof is set but no profiling router is configured"),
            }
        }
        if self.config.enable_swagger {
            match self.api_docs {
                Some(docs) => router = router.nest("/swagger", docs),
                None => warn!("enable-swagger is set but no api docs router is configured"),
            }
        }

        router = router.fallback(health::not_found);
        if self.config.enable_cors {
            router = router.layer(cors_layer());
        }
        router
    }
}

/// Routes registered through [`Engine::group`].
pub struct Group<'a> {
    engine: &'a mut Engine,
    prefix: String,
}

impl Group<'_> {
    fn join(&self, path: &str) -> String {
        format!("{}/{}", self.prefix, path.trim_start_matches('/'))
    }

    pub fn handle(&mut self, method: MethodFilter, path: &str, handler: impl Handler) -> &mut Self {
        let path = self.join(path);
        self.engine.handle(method, &path, handler);
        self
    }

    pub fn handle_with_alias(
        &mut self,
        method: MethodFilter,
        path: &str,
        alias: &str,
        handler: impl Handler,
    ) -> &mut Self {
        let path = self.join(path);
        self.engine.handle_with_alias(method, &path, alias, handler);
        self
    }

    pub fn get(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.handle(MethodFilter::GET, path, handler)
    }

    pub fn post(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.handle(MethodFilter::POST, path, handler)
    }

    pub fn put(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.handle(MethodFilter::PUT, path, handler)
    }

    pub fn patch(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.handle(MethodFilter::PATCH, path, handler)
    }

    pub fn delete(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.handle(MethodFilter::DELETE, path, handler)
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::HEAD,
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
