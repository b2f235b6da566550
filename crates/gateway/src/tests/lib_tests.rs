use super::*;
use std::collections::HashMap;

use axum::{extract::State, routing::post, Form, Json, Router};
use serde_json::json;
use shared::domain::{ContactId, GroupId};
use tokio::{
    net::TcpListener,
    sync::{mpsc, Mutex},
};

type CallLog = mpsc::UnboundedSender<HashMap<String, String>>;

#[derive(Clone)]
struct BackendState {
    calls: CallLog,
    replies: Arc<Mutex<HashMap<(String, String), Value>>>,
}

async fn rest_endpoint(
    State(state): State<BackendState>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    let key = (
        form.get("entity").cloned().unwrap_or_default(),
        form.get("action").cloned().unwrap_or_default(),
    );
    let _ = state.calls.send(form);
    let reply = state
        .replies
        .lock()
        .await
        .get(&key)
        .cloned()
        .unwrap_or_else(|| json!({ "is_error": 1, "error_message": "unexpected call" }));
    Json(reply)
}

async fn spawn_backend(
    replies: Vec<((&str, &str), Value)>,
) -> anyhow::Result<(Url, mpsc::UnboundedReceiver<HashMap<String, String>>)> {
    let (calls, calls_rx) = mpsc::unbounded_channel();
    let replies = replies
        .into_iter()
        .map(|((entity, action), reply)| ((entity.to_string(), action.to_string()), reply))
        .collect();
    let state = BackendState {
        calls,
        replies: Arc::new(Mutex::new(replies)),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new()
        .route("/civicrm/extern/rest.php", post(rest_endpoint))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let endpoint = Url::parse(&format!("http://{addr}/civicrm/extern/rest.php"))?;
    Ok((endpoint, calls_rx))
}

fn api_for(endpoint: Url) -> NewsletterApi {
    let gateway = HttpGateway::new(endpoint)
        .with_credentials(Some("user-key".into()), Some("site-key".into()));
    NewsletterApi::new(Arc::new(gateway))
}

#[tokio::test]
async fn http_gateway_posts_entity_action_credentials_and_json_params() {
    let (endpoint, mut calls) = spawn_backend(vec![(
        (SUBSCRIPTION_ENTITY, "get"),
        json!({ "is_error": 0, "values": [] }),
    )])
    .await
    .expect("spawn backend");

    let status = api_for(endpoint)
        .subscription_status("default", "abc123")
        .await
        .expect("call");
    assert!(status.is_none());

    let form = calls.recv().await.expect("recorded call");
    assert_eq!(form["entity"], "NewsletterSubscription");
    assert_eq!(form["action"], "get");
    assert_eq!(form["api_key"], "user-key");
    assert_eq!(form["key"], "site-key");
    let params: Value = serde_json::from_str(&form["json"]).expect("json params");
    assert_eq!(
        params,
        json!({ "profile": "default", "contact_checksum": "abc123" })
    );
}

#[tokio::test]
async fn profiles_keep_backend_order_and_names() {
    let (endpoint, _calls) = spawn_backend(vec![(
        (PROFILE_ENTITY, "get"),
        json!({
            "is_error": 0,
            "values": {
                "spring": { "form_title": "Spring" },
                "autumn": { "form_title": "Autumn" }
            }
        }),
    )])
    .await
    .expect("spawn backend");

    let profiles = api_for(endpoint).profiles().await.expect("profiles");
    let names: Vec<_> = profiles.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["spring", "autumn"]);
    assert_eq!(profiles[1].form_title, "Autumn");
}

#[tokio::test]
async fn single_profile_takes_requested_name() {
    let (endpoint, mut calls) = spawn_backend(vec![(
        (PROFILE_ENTITY, "getsingle"),
        json!({
            "is_error": 0,
            "values": { "3": { "form_title": "Weekly", "mailing_lists": { "4": "News" } } }
        }),
    )])
    .await
    .expect("spawn backend");

    let profile = api_for(endpoint)
        .profile("weekly")
        .await
        .expect("call")
        .expect("profile");
    assert_eq!(profile.name, "weekly");
    assert_eq!(profile.single_mailing_list(), Some(GroupId(4)));

    let form = calls.recv().await.expect("recorded call");
    let params: Value = serde_json::from_str(&form["json"]).expect("json params");
    assert_eq!(params, json!({ "name": "weekly" }));
}

#[tokio::test]
async fn single_profile_keeps_a_name_sent_by_the_backend() {
    let (endpoint, _calls) = spawn_backend(vec![(
        (PROFILE_ENTITY, "getsingle"),
        json!({
            "is_error": 0,
            "values": { "3": { "name": "weekly_digest", "form_title": "Weekly" } }
        }),
    )])
    .await
    .expect("spawn backend");

    let profile = api_for(endpoint)
        .profile("weekly")
        .await
        .expect("call")
        .expect("profile");
    assert_eq!(profile.name, "weekly_digest");
}

#[tokio::test]
async fn backend_errors_read_as_missing_records() {
    let (endpoint, _calls) = spawn_backend(vec![
        (
            (PROFILE_ENTITY, "getsingle"),
            json!({ "is_error": 1, "error_message": "Expected one NewsletterProfile" }),
        ),
        (
            (SUBSCRIPTION_ENTITY, "get"),
            json!({ "is_error": "1", "error_message": "Invalid checksum" }),
        ),
    ])
    .await
    .expect("spawn backend");
    let api = api_for(endpoint);

    assert!(api.profile("missing").await.expect("call").is_none());
    assert!(api
        .subscription_status("default", "stale")
        .await
        .expect("call")
        .is_none());
}

#[tokio::test]
async fn auto_confirm_sends_autoconfirm_flag() {
    let (endpoint, mut calls) = spawn_backend(vec![(
        (SUBSCRIPTION_ENTITY, "confirm"),
        json!({ "is_error": 0, "values": [] }),
    )])
    .await
    .expect("spawn backend");

    let subscription: Subscription = serde_json::from_value(json!({
        "contact": { "id": 42, "checksum": "cs-42" },
        "subscription_status": []
    }))
    .expect("subscription");

    let reply = api_for(endpoint)
        .auto_confirm("default", &subscription)
        .await
        .expect("call");
    assert!(!reply.is_error);
    assert!(!reply.has_values());

    let form = calls.recv().await.expect("recorded call");
    let params: Value = serde_json::from_str(&form["json"]).expect("json params");
    assert_eq!(params["autoconfirm"], json!(1));
    assert_eq!(params["contact_id"], json!(ContactId(42).0));
    assert_eq!(params["contact_checksum"], json!("cs-42"));
}

#[tokio::test]
async fn transport_failure_is_an_error_not_a_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let endpoint = Url::parse(&format!("http://{addr}/rest")).expect("url");
    let err = api_for(endpoint)
        .request(&RequestParams {
            profile: "default".into(),
            contact_checksum: None,
            contact_id: None,
            fields: Default::default(),
        })
        .await
        .expect_err("must fail");
    let gateway_err = err.downcast_ref::<GatewayError>().expect("gateway error");
    assert!(matches!(gateway_err, GatewayError::Transport { .. }));
}

#[tokio::test]
async fn undecodable_reply_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().route("/rest", post(|| async { "<html>maintenance</html>" }));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let endpoint = Url::parse(&format!("http://{addr}/rest")).expect("url");
    let err = api_for(endpoint)
        .profiles()
        .await
        .expect_err("must fail");
    let gateway_err = err.downcast_ref::<GatewayError>().expect("gateway error");
    assert!(matches!(gateway_err, GatewayError::MalformedReply { .. }));
}
