//! Observability wiring for the admin API.
//!
//! # Purpose
//! Installs the tracing subscriber, optional OTLP span export, W3C
//! trace-context propagation, and the Prometheus recorder that backs the
//! authentication counters.
//!
//! # Notes
//! Spans are exported only when `OTEL_EXPORTER_OTLP_ENDPOINT` is set, so a
//! local run logs to stdout without dialing a collector. Every installer
//! is guarded by a `OnceLock`; repeated calls from tests are no-ops.
use crate::config::Environment;
use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const METRICS_PATH: &str = "/metrics";

const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

static SUBSCRIBER: OnceLock<()> = OnceLock::new();
static PROPAGATOR: OnceLock<()> = OnceLock::new();
static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_observability(
    service_name: &str,
    environment: Environment,
) -> anyhow::Result<PrometheusHandle> {
    install_propagator();
    SUBSCRIBER.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false));
        match span_exporter(service_name, environment) {
            Some(provider) => {
                let tracer = provider.tracer(service_name.to_string());
                global::set_tracer_provider(provider);
                let _ = registry
                    .with(tracing_opentelemetry::layer().with_tracer(tracer))
                    .try_init();
            }
            None => {
                let _ = registry.try_init();
            }
        }
    });
    install_metrics_recorder()
}

fn install_propagator() {
    PROPAGATOR.get_or_init(|| global::set_text_map_propagator(TraceContextPropagator::new()));
}

fn span_exporter(service_name: &str, environment: Environment) -> Option<SdkTracerProvider> {
    std::env::var(OTLP_ENDPOINT_ENV)
        .ok()
        .filter(|endpoint| !endpoint.trim().is_empty())?;
    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
    {
        Ok(exporter) => exporter,
        Err(err) => {
            eprintln!("otlp span export disabled: {err}");
            return None;
        }
    };
    let resource = Resource::builder_empty()
        .with_attributes(resource_attributes(service_name, environment))
        .build();
    Some(
        SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build(),
    )
}

fn resource_attributes(service_name: &str, environment: Environment) -> Vec<KeyValue> {
    let deployment = std::env::var("DEPLOYMENT_ENVIRONMENT")
        .unwrap_or_else(|_| environment.as_str().to_string());
    let mut attrs = vec![
        KeyValue::new("service.name", service_name.to_string()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        KeyValue::new("deployment.environment", deployment),
    ];
    if let Ok(instance) =
        std::env::var("ATRIUM_SERVICE_INSTANCE_ID").or_else(|_| std::env::var("HOSTNAME"))
    {
        attrs.push(KeyValue::new("service.instance.id", instance));
    }
    attrs
}

/// Parent context carried by `traceparent`/`tracestate` on an inbound request.
pub fn trace_context_from_headers(headers: &axum::http::HeaderMap) -> opentelemetry::Context {
    install_propagator();
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

struct HeaderExtractor<'a>(&'a axum::http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

fn install_metrics_recorder() -> anyhow::Result<PrometheusHandle> {
    if let Some(handle) = RECORDER.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("install prometheus recorder")?;
    describe_auth_metrics();
    Ok(RECORDER.get_or_init(|| handle).clone())
}

fn describe_auth_metrics() {
    metrics::describe_counter!(
        "atrium_auth_logins_total",
        "Successful logins, labelled by provisioning mode"
    );
    metrics::describe_counter!(
        "atrium_auth_failures_total",
        "Refused logins and request authorizations, labelled by reason"
    );
    metrics::describe_counter!(
        "atrium_identities_provisioned_total",
        "Users created by sync provisioning"
    );
}

/// Serve the Prometheus scrape endpoint on its own listener.
pub async fn serve_metrics<F>(
    handle: PrometheusHandle,
    addr: SocketAddr,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, path = METRICS_PATH, "metrics listener bound");
    serve_metrics_with_listener(handle, listener, shutdown).await
}

async fn serve_metrics_with_listener<F>(
    handle: PrometheusHandle,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = axum::Router::new().route(
        METRICS_PATH,
        axum::routing::get(move || async move { handle.render() }),
    );
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{TraceContextExt, TraceId};
    use serial_test::serial;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn attribute(attrs: &[KeyValue], key: &str) -> Option<String> {
        attrs
            .iter()
            .find(|attr| attr.key.as_str() == key)
            .map(|attr| attr.value.to_string())
    }

    fn set_env(key: &str, value: Option<&str>) {
        unsafe {
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
    }

    #[test]
    #[serial]
    fn deployment_environment_follows_config() {
        set_env("DEPLOYMENT_ENVIRONMENT", None);
        set_env("ATRIUM_SERVICE_INSTANCE_ID", Some("admin-0"));

        let attrs = resource_attributes("atrium-admin-api", Environment::Production);
        assert_eq!(
            attribute(&attrs, "service.name").as_deref(),
            Some("atrium-admin-api")
        );
        assert_eq!(
            attribute(&attrs, "deployment.environment").as_deref(),
            Some("production")
        );
        assert_eq!(
            attribute(&attrs, "service.instance.id").as_deref(),
            Some("admin-0")
        );

        set_env("DEPLOYMENT_ENVIRONMENT", Some("staging"));
        let attrs = resource_attributes("atrium-admin-api", Environment::Production);
        assert_eq!(
            attribute(&attrs, "deployment.environment").as_deref(),
            Some("staging")
        );
        set_env("DEPLOYMENT_ENVIRONMENT", None);
        set_env("ATRIUM_SERVICE_INSTANCE_ID", None);
    }

    #[test]
    #[serial]
    fn spans_are_not_exported_without_endpoint() {
        set_env(OTLP_ENDPOINT_ENV, None);
        assert!(span_exporter("atrium-admin-api", Environment::Development).is_none());
        set_env(OTLP_ENDPOINT_ENV, Some("  "));
        assert!(span_exporter("atrium-admin-api", Environment::Development).is_none());
        set_env(OTLP_ENDPOINT_ENV, None);
    }

    #[test]
    fn inbound_traceparent_becomes_parent_context() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            "traceparent",
            axum::http::HeaderValue::from_static(
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            ),
        );
        let context = trace_context_from_headers(&headers);
        let span = context.span();
        let span_context = span.span_context();
        assert!(span_context.is_remote());
        assert_eq!(
            span_context.trace_id(),
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").expect("trace id")
        );
    }

    #[test]
    fn missing_traceparent_yields_empty_context() {
        let context = trace_context_from_headers(&axum::http::HeaderMap::new());
        assert!(!context.span().span_context().is_valid());
    }

    #[tokio::test(flavor = "multi_thread")]
    #[serial]
    async fn scrape_endpoint_renders_auth_counters() {
        set_env(OTLP_ENDPOINT_ENV, None);
        let first = init_observability("atrium-admin-api", Environment::Development)
            .expect("observability");
        let handle = init_observability("atrium-admin-api", Environment::Development)
            .expect("idempotent");
        drop(first);
        metrics::counter!("atrium_auth_failures_total", "reason" => "missing_token").increment(1);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve_metrics_with_listener(handle, listener, async move {
            let _ = shutdown_rx.await;
        }));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .no_proxy()
            .build()
            .expect("client");
        let body = client
            .get(format!("http://{addr}{METRICS_PATH}"))
            .send()
            .await
            .expect("scrape")
            .error_for_status()
            .expect("status")
            .text()
            .await
            .expect("body");
        assert!(body.contains("atrium_auth_failures_total{reason=\"missing_token\"}"));

        let _ = shutdown_tx.send(());
        let _ = tokio::time::timeout(Duration::from_secs(1), server).await;
    }
}
