use axum::{
    body::Bytes,
    http::{header::AUTHORIZATION, HeaderMap, Method, StatusCode, Uri},
    Json, Router,
};
use byki_migrate::{
    identity::{EmailLookup, IdentityResolver, PasswordSignIn},
    store::{Credential, DocumentStore, FirestoreClient, StoreError, Write},
    MigrationError,
};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use test_log::test;
use tokio::net::TcpListener;
use url::Url;

#[derive(Debug, Clone)]
struct Seen {
    method: Method,
    path: String,
    query: String,
    authorization: Option<String>,
    body: Value,
}

type Reply = Arc<dyn Fn(&Seen) -> (StatusCode, Value) + Send + Sync>;

/// Local HTTP server answering every request with `reply`.
struct Stub {
    endpoint: Url,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Stub {
    async fn start(reply: impl Fn(&Seen) -> (StatusCode, Value) + Send + Sync + 'static) -> Self {
        let reply: Reply = Arc::new(reply);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let app = Router::new().fallback(
            move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
                let reply = reply.clone();
                let log = log.clone();
                async move {
                    let request = Seen {
                        method,
                        path: uri.path().to_owned(),
                        query: uri.query().unwrap_or_default().to_owned(),
                        authorization: headers
                            .get(AUTHORIZATION)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_owned),
                        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
                    };
                    let (status, json) = reply(&request);
                    log.lock().unwrap().push(request);
                    (status, Json(json))
                }
            },
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        Stub { endpoint, seen }
    }

    fn requests(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

fn not_found() -> (StatusCode, Value) {
    (
        StatusCode::NOT_FOUND,
        json!({ "error": { "code": 404, "message": "Document not found", "status": "NOT_FOUND" } }),
    )
}

fn http() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[test(tokio::test)]
async fn sign_in_token_authorizes_store() {
    let stub = Stub::start(|req| {
        if req.path.ends_with("/v1/accounts:signInWithPassword") {
            (
                StatusCode::OK,
                json!({ "localId": "uid-42", "idToken": "id-token-42", "email": "demo@byki.com" }),
            )
        } else if req.path.ends_with("/documents/users/uid-42/parts/p1") {
            (
                StatusCode::OK,
                json!({
                    "name": "projects/p/databases/(default)/documents/users/uid-42/parts/p1",
                    "fields": { "sku": { "stringValue": "A-1" } }
                }),
            )
        } else {
            not_found()
        }
    })
    .await;

    let sign_in = PasswordSignIn::new(
        http(),
        "web-key".into(),
        "demo@byki.com".into(),
        "secret".into(),
    )
    .with_endpoint(stub.endpoint.clone());
    let store = FirestoreClient::new(http(), "p", Credential::SignedIn(sign_in.token()))
        .with_endpoint(stub.endpoint.clone());

    assert!(matches!(
        store.get("users/uid-42/parts/p1").await,
        Err(StoreError::Unauthenticated)
    ));

    let owner = sign_in.resolve_owner_id().await.unwrap();
    assert_eq!(owner.as_str(), "uid-42");
    assert_eq!(sign_in.token().get().as_deref(), Some("id-token-42"));

    let doc = store.get("users/uid-42/parts/p1").await.unwrap().unwrap();
    assert_eq!(doc.id, "p1");
    assert_eq!(doc.data["sku"], json!({ "stringValue": "A-1" }));
    assert!(store.get("users/uid-42/parts/gone").await.unwrap().is_none());
    assert!(!store.exists("users/uid-42/parts/gone").await.unwrap());

    let requests = stub.requests();
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].query, "key=web-key");
    assert_eq!(requests[0].body["email"], "demo@byki.com");
    assert_eq!(requests[0].body["returnSecureToken"], true);
    assert_eq!(
        requests[1].authorization.as_deref(),
        Some("Bearer id-token-42")
    );
}

#[test(tokio::test)]
async fn sign_in_with_unknown_email() {
    let stub = Stub::start(|_| {
        (
            StatusCode::BAD_REQUEST,
            json!({ "error": { "code": 400, "message": "EMAIL_NOT_FOUND", "errors": [] } }),
        )
    })
    .await;
    let sign_in = PasswordSignIn::new(
        http(),
        "web-key".into(),
        "nobody@byki.com".into(),
        "secret".into(),
    )
    .with_endpoint(stub.endpoint.clone());

    let err = sign_in.resolve_owner_id().await.unwrap_err();
    assert!(matches!(err, MigrationError::IdentityNotFound(email) if email == "nobody@byki.com"));
    assert!(sign_in.token().get().is_none());
}

#[test(tokio::test)]
async fn email_lookup_responses() {
    let stub = Stub::start(|req| match req.body["email"][0].as_str() {
        Some("demo@byki.com") => (
            StatusCode::OK,
            json!({ "users": [{ "localId": "uid-7", "email": "demo@byki.com" }] }),
        ),
        Some("ghost@byki.com") => (
            StatusCode::OK,
            json!({ "kind": "identitytoolkit#GetAccountInfoResponse" }),
        ),
        Some("gone@byki.com") => not_found(),
        _ => (
            StatusCode::FORBIDDEN,
            json!({ "error": { "code": 403, "message": "PERMISSION_DENIED" } }),
        ),
    })
    .await;
    let lookup = |email: &str| {
        EmailLookup::new(http(), "p".into(), email.into(), "admin-token".into())
            .with_endpoint(stub.endpoint.clone())
    };

    let owner = lookup("demo@byki.com").resolve_owner_id().await.unwrap();
    assert_eq!(owner.as_str(), "uid-7");
    assert!(matches!(
        lookup("ghost@byki.com").resolve_owner_id().await,
        Err(MigrationError::IdentityNotFound(_))
    ));
    assert!(matches!(
        lookup("gone@byki.com").resolve_owner_id().await,
        Err(MigrationError::IdentityNotFound(_))
    ));
    assert!(matches!(
        lookup("other@byki.com").resolve_owner_id().await,
        Err(MigrationError::AuthenticationFailed(msg)) if msg.contains("PERMISSION_DENIED")
    ));

    let requests = stub.requests();
    assert_eq!(requests[0].path, "/v1/projects/p/accounts:lookup");
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer admin-token"));
}

#[test(tokio::test)]
async fn firestore_reads() {
    let stub = Stub::start(|req| {
        if req.path.ends_with("/documents/users/u1:runAggregationQuery") {
            (
                StatusCode::OK,
                json!([{ "result": { "aggregateFields": { "count": { "integerValue": "2" } } } }]),
            )
        } else if req.path.ends_with("/documents/parts") {
            let doc = |id: &str| {
                json!({ "name": format!("projects/p/databases/(default)/documents/parts/{}", id) })
            };
            if req.query.contains("pageToken=t1") {
                (StatusCode::OK, json!({ "documents": [doc("p2")] }))
            } else {
                (
                    StatusCode::OK,
                    json!({ "documents": [doc("p1")], "nextPageToken": "t1" }),
                )
            }
        } else if req.path.ends_with("/documents/customers") {
            (StatusCode::OK, json!({}))
        } else {
            not_found()
        }
    })
    .await;
    let store = FirestoreClient::new(http(), "p", Credential::AccessToken("admin".into()))
        .with_endpoint(stub.endpoint.clone())
        .with_page_size(50);

    let ids: Vec<_> = store
        .list_all("parts")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["p1", "p2"]);
    assert_eq!(store.count("users/u1/parts").await.unwrap(), 2);
    assert_eq!(store.first("parts").await.unwrap().unwrap().id, "p1");
    assert!(!store.is_empty("parts").await.unwrap());
    assert!(store.is_empty("customers").await.unwrap());

    let requests = stub.requests();
    assert_eq!(requests[0].query, "pageSize=50");
    assert_eq!(requests[1].query, "pageSize=50&pageToken=t1");
    assert_eq!(requests[2].method, Method::POST);
    assert_eq!(
        requests[2].body["structuredAggregationQuery"]["structuredQuery"]["from"][0]
            ["collectionId"],
        "parts"
    );
    // Emptiness and sampling only fetch a single document.
    assert!(requests[3..].iter().all(|r| r.query == "pageSize=1"));
    assert!(requests.iter().all(|r| r.authorization.as_deref() == Some("Bearer admin")));
}

#[test(tokio::test)]
async fn rejected_commit() {
    let stub = Stub::start(|_| {
        (
            StatusCode::FORBIDDEN,
            json!({ "error": {
                "code": 403,
                "message": "Missing or insufficient permissions.",
                "status": "PERMISSION_DENIED"
            } }),
        )
    })
    .await;
    let store = FirestoreClient::new(http(), "p", Credential::AccessToken("admin".into()))
        .with_endpoint(stub.endpoint.clone());

    let err = store
        .commit(vec![Write::Set {
            path: "users/u1/parts/p1".into(),
            data: Map::new(),
        }])
        .await
        .unwrap_err();
    match err {
        StoreError::Status { status, message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "Missing or insufficient permissions. (PERMISSION_DENIED)");
        }
        other => panic!("unexpected error {:?}", other),
    }
    let requests = stub.requests();
    assert!(requests[0].path.ends_with("/documents:commit"));
    assert_eq!(
        requests[0].body["writes"][0]["update"]["name"],
        "projects/p/databases/(default)/documents/users/u1/parts/p1"
    );
}
