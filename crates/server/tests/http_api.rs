use kata_client::{HttpTransport, Transport};
use kata_protocol::RpcCall;
use kata_rpc::{to_row, DbHandle, MemoryDatabase, Role, SessionUser};
use kata_server::app::build_service;
use kata_server::app::models::{TABLES, USERS};
use kata_server::blob::SignedUrlStore;
use kata_server::config::SupportedLocales;
use kata_server::http_router;
use kata_server::sessions::issue_session;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

struct Served {
    base_url: String,
    member: String,
    http: reqwest::Client,
}

async fn serve() -> Served {
    let db: DbHandle = Arc::new(MemoryDatabase::with_tables(TABLES));
    let ada = SessionUser {
        id: "ada".to_string(),
        name: "Ada".to_string(),
        email: "ada@kata.test".to_string(),
        role: Role::User,
        banned: false,
    };
    db.insert(USERS, to_row(&ada).unwrap()).await.unwrap();
    let member = issue_session(&db, "ada", None).await.unwrap();

    let blobs = Arc::new(SignedUrlStore::new(
        "https://blobs.test",
        "secret",
        Duration::from_secs(60),
    ));
    let service = build_service(db, blobs, false).unwrap();
    let app = http_router(service, SupportedLocales::parse("en,de").unwrap());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Served {
        base_url: format!("http://{addr}"),
        member,
        http: reqwest::Client::new(),
    }
}

impl Served {
    async fn post(&self, body: Value, token: Option<&str>) -> reqwest::Response {
        let mut request = self.http.post(format!("{}/rpc", self.base_url)).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.unwrap()
    }
}

#[tokio::test]
async fn rpc_status_follows_error_code() {
    let served = serve().await;

    let anonymous = served
        .post(json!({ "path": "user.me", "type": "query" }), None)
        .await;
    assert_eq!(anonymous.status().as_u16(), 401);
    assert_eq!(anonymous.headers()["www-authenticate"], "Bearer");
    let body: Value = anonymous.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let forbidden = served
        .post(
            json!({ "path": "admin.listUsers", "type": "query" }),
            Some(&served.member),
        )
        .await;
    assert_eq!(forbidden.status().as_u16(), 403);
    assert!(forbidden.headers().get("www-authenticate").is_none());

    let missing = served
        .post(json!({ "path": "exercise.nope", "type": "query" }), None)
        .await;
    assert_eq!(missing.status().as_u16(), 404);

    let ok = served
        .post(json!({ "path": "user.me", "type": "query" }), Some(&served.member))
        .await;
    assert_eq!(ok.status().as_u16(), 200);
    let body: Value = ok.json().await.unwrap();
    assert_eq!(body["data"]["id"], "ada");
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let served = serve().await;
    let response = served
        .http
        .post(format!("{}/rpc", served.base_url))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn http_transport_round_trips_envelopes() {
    let served = serve().await;
    let mut transport = HttpTransport::new(&served.base_url);
    transport.set_token(Some(served.member.clone()));

    let me = transport
        .call(RpcCall::query("user.me", Value::Null))
        .await
        .unwrap();
    assert_eq!(me["email"], "ada@kata.test");

    transport.set_token(None);
    let err = transport
        .call(RpcCall::query("user.me", Value::Null))
        .await
        .unwrap_err();
    assert_eq!(
        err.envelope().map(|e| e.code),
        Some(kata_protocol::ErrorCode::Unauthorized)
    );
}

#[tokio::test]
async fn health_and_locale_routes() {
    let served = serve().await;

    let health: Value = served
        .http
        .get(format!("{}/health", served.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({ "status": "ok", "procedures": 14 }));

    let accepted = served
        .http
        .get(format!("{}/api/locale?locale=de", served.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status().as_u16(), 200);
    let cookie = accepted.headers()["set-cookie"].to_str().unwrap().to_string();
    assert!(cookie.starts_with("NEXT_LOCALE=de;"));

    let rejected = served
        .http
        .get(format!("{}/api/locale?locale=fr", served.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status().as_u16(), 400);
    assert!(rejected.headers().get("set-cookie").is_none());
}
