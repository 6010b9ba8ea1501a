use kata_protocol::RpcCall;
use kata_rpc::{
    ContextBuilder, DbHandle, FixedSession, Issues, MemoryDatabase, Pipeline, PublicContext,
    RequestMeta, Router, RpcService, Validate,
};
use pretty_assertions::assert_eq;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Keeps every `info` line emitted by this test binary.
struct Captured {
    lines: Mutex<Vec<String>>,
}

impl log::Log for Captured {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if record.level() == log::Level::Info {
            self.lines.lock().unwrap().push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

static CAPTURED: Captured = Captured {
    lines: Mutex::new(Vec::new()),
};

fn lines_for(path: &str) -> Vec<String> {
    let needle = format!("path={path} ");
    CAPTURED
        .lines
        .lock()
        .unwrap()
        .iter()
        .filter(|line| line.contains(&needle))
        .cloned()
        .collect()
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct Echo {
    text: String,
}

impl Validate for Echo {
    fn validate(&self, issues: &mut Issues) {
        issues.require_non_empty("text", &self.text);
    }
}

fn service(namespace: &str, development: bool) -> RpcService {
    let pipeline = Pipeline::new().with_logging(development);
    let group = Router::builder().procedure(
        "echo",
        pipeline
            .public()
            .query(|_ctx: PublicContext, input: Echo| async move { Ok(input.text) }),
    );
    let router = Router::builder().merge(namespace, group).build().unwrap();
    let db: DbHandle = Arc::new(MemoryDatabase::with_tables(&[]));
    RpcService::new(router, ContextBuilder::new(Arc::new(FixedSession(None)), db))
        .with_call_logging(development)
}

async fn call(service: &RpcService, path: &str, input: Value) {
    service
        .handle(&RequestMeta::anonymous(), RpcCall::query(path, input))
        .await;
}

#[tokio::test]
async fn every_call_is_logged_once_in_development_only() {
    log::set_logger(&CAPTURED).unwrap();
    log::set_max_level(log::LevelFilter::Info);

    let dev = service("dev", true);
    call(&dev, "dev.missing", Value::Null).await;
    call(&dev, "dev.echo", json!({ "text": "" })).await;
    call(&dev, "dev.echo", json!({ "text": "hi" })).await;

    let missing = lines_for("dev.missing");
    assert_eq!(missing.len(), 1);
    assert!(missing[0].contains("outcome=NOT_FOUND"));
    assert!(missing[0].contains("caller=unresolved"));

    let echo = lines_for("dev.echo");
    assert_eq!(echo.len(), 2);
    assert!(echo[0].contains("outcome=BAD_REQUEST"));
    assert!(echo[1].contains("outcome=ok"));
    assert!(echo[1].contains("caller=anonymous"));

    let prod = service("prod", false);
    call(&prod, "prod.missing", Value::Null).await;
    call(&prod, "prod.echo", json!({ "text": "" })).await;
    call(&prod, "prod.echo", json!({ "text": "hi" })).await;
    assert_eq!(lines_for("prod.missing"), Vec::<String>::new());
    assert_eq!(lines_for("prod.echo"), Vec::<String>::new());
}
