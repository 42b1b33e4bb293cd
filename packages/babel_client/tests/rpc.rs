mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::{Value, json};

use babel_client::error::STATUS_UNAVAILABLE;
use babel_client::schema::{NotificationLevel, OffTheRecordStatus, Response, TypingType};
use babel_client::{
    ChatApi, ClientError, Cookies, FetchError, FetchResponse, REQUIRED_COOKIES, SendChatMessage,
    Session,
};
use common::*;

fn api_with(http: Arc<RecordingHttp>, cookies: Cookies) -> ChatApi {
    let config = config();
    ChatApi::new(cookies, http, Session::shared(&config), &config)
        .with_id_source(SequentialIds::starting_at(42))
}

fn api(http: Arc<RecordingHttp>) -> ChatApi {
    api_with(http, cookies())
}

fn network_error(err: ClientError) -> (i64, String) {
    let network = err.as_network().expect("expected a network error");
    (network.status, network.description.clone())
}

#[tokio::test]
async fn missing_cookie_fails_before_any_request() {
    for missing in REQUIRED_COOKIES {
        let jar: Cookies = REQUIRED_COOKIES
            .iter()
            .filter(|name| **name != missing)
            .map(|name| (*name, "v"))
            .collect();
        let http = RecordingHttp::ok();
        let err = api_with(http.clone(), jar)
            .get_self_info()
            .await
            .unwrap_err();

        assert!(err.is_configuration(), "{missing}: {err}");
        assert!(matches!(&err, ClientError::MissingCookie(name) if name == missing));
        assert!(http.requests().is_empty(), "{missing}: request was sent");
    }
}

#[tokio::test]
async fn request_is_signed_and_parameterized() {
    let http = RecordingHttp::ok();
    api(http.clone()).set_focus("conv-1").await.unwrap();

    let request = &http.requests()[0];
    assert_eq!(request.url, "https://chat.test/chat/v1/conversations/setfocus");
    assert_eq!(request.param("alt"), Some("protojson"));
    assert_eq!(request.header("content-type"), Some("application/json+protobuf"));
    assert_eq!(request.header("x-origin"), Some("https://talkgadget.google.com"));
    assert_eq!(request.header("x-goog-authuser"), Some("0"));
    let authorization = request.header("authorization").unwrap();
    assert!(authorization.starts_with("SAPISIDHASH "), "{authorization}");

    let names: Vec<&str> = request.cookies.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, REQUIRED_COOKIES);

    let body: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body[1], json!(["conv-1"]));
    assert_eq!(body[2], json!(1));
    assert_eq!(body[3], json!(20));
}

#[tokio::test]
async fn header_gains_resource_once_client_id_is_known() {
    let http = RecordingHttp::ok();
    let api = api(http.clone());

    api.search_entities("ada", 5).await.unwrap();
    api.session().lock().await.set_client_id("c7".into());
    api.search_entities("ada", 5).await.unwrap();

    let bodies = http.bodies("contacts/searchentities");
    let version = config().client_version;
    assert_eq!(bodies[0][0], json!([[null, null, version], null, null, "en"]));
    assert_eq!(bodies[1][0], json!([[null, null, version], ["c7"], null, "en"]));
    assert_eq!(bodies[1][2], json!("ada"));
    assert_eq!(bodies[1][3], json!(5));
}

#[tokio::test]
async fn non_ok_status_carries_exact_status_and_description() {
    let http = RecordingHttp::with(|_| Ok(reply(json!(["tag", [4, "invalid conversation"]]))));
    let err = api(http).set_typing("conv", TypingType::Started).await;
    let (status, description) = network_error(err.unwrap_err());
    assert_eq!(status, 4);
    assert_eq!(description, "invalid conversation");
}

#[tokio::test]
async fn non_ok_status_without_description() {
    let http = RecordingHttp::with(|_| Ok(reply(json!(["tag", [2]]))));
    let err = api(http).get_self_info().await.unwrap_err();
    assert_eq!(network_error(err), (2, String::new()));
}

#[tokio::test]
async fn transport_failures_are_normalized() {
    let http = RecordingHttp::with(|_| {
        Err(FetchError::Status {
            status: 502,
            body: "bad gateway".into(),
        })
    });
    let err = api(http.clone()).delete_conversation("c").await.unwrap_err();
    assert_eq!(err.as_network().unwrap().status, 502);

    http.respond_with(|_| Err(FetchError::Other("connection reset".into())));
    let err = api(http.clone()).delete_conversation("c").await.unwrap_err();
    assert_eq!(err.as_network().unwrap().status, STATUS_UNAVAILABLE);

    http.respond_with(|_| {
        Ok(FetchResponse {
            status: 200,
            body: b"<html>".to_vec(),
        })
    });
    let err = api(http).delete_conversation("c").await.unwrap_err();
    let network = err.as_network().unwrap();
    assert_eq!(network.status, STATUS_UNAVAILABLE);
    assert!(network.is_transport());
}

#[tokio::test]
async fn non_utf8_reply_is_malformed() {
    let http = RecordingHttp::with(|_| {
        Ok(FetchResponse {
            status: 200,
            body: b")]}'\n[\"cgsirp\",[1],\"\xff\"]".to_vec(),
        })
    });
    let err = api(http).get_self_info().await.unwrap_err();
    let network = err.as_network().unwrap();
    assert_eq!(network.status, STATUS_UNAVAILABLE);
    assert!(network.is_transport());
}

#[tokio::test]
async fn ok_response_is_decoded() {
    let http = RecordingHttp::with(|_| {
        Ok(reply(json!([
            "cscmr",
            [1, null, null, "trace-1"],
            null,
            ["conv"]
        ])))
    });
    let response: Response = api(http).set_focus("conv").await.unwrap();
    assert_eq!(response.header.request_trace_id.as_deref(), Some("trace-1"));
    assert_eq!(response.field(3), Some(&json!(["conv"])));
}

#[tokio::test]
async fn send_chat_message_layout() {
    let http = RecordingHttp::ok();
    let api = api(http.clone());

    api.send_chat_message(&SendChatMessage::text("conv", "hi"))
        .await
        .unwrap();
    api.send_chat_message(
        &SendChatMessage::text("conv", "pic")
            .with_image("photo-1")
            .with_otr_status(OffTheRecordStatus::OffTheRecord)
            .with_client_generated_id(7),
    )
    .await
    .unwrap();

    let bodies = http.bodies("conversations/sendchatmessage");
    assert_eq!(bodies[0][5], json!([[[0, "hi"]]]));
    assert_eq!(bodies[0][6], Value::Null);
    assert_eq!(bodies[0][7], json!([["conv"], 42, 2, [1], 1]));

    assert_eq!(bodies[1][6], json!([["photo-1"]]));
    assert_eq!(bodies[1][7], json!([["conv"], 7, 1, [1], 1]));
}

#[tokio::test]
async fn create_conversation_type_follows_invitees() {
    let http = RecordingHttp::ok();
    let api = api(http.clone());

    api.create_conversation(&["g1"], false).await.unwrap();
    api.create_conversation(&["g1", "g2"], false).await.unwrap();
    api.create_conversation(&["g1"], true).await.unwrap();

    let bodies = http.bodies("conversations/createconversation");
    let types: Vec<&Value> = bodies.iter().map(|b| &b[1]).collect();
    assert_eq!(types, vec![&json!(1), &json!(2), &json!(2)]);
    assert_eq!(bodies[0][2], json!(42));
    assert_eq!(bodies[1][2], json!(43));
    assert_eq!(bodies[1][4], json!([["g1"], ["g2"]]));
}

#[tokio::test]
async fn presence_and_mood() {
    let http = RecordingHttp::ok();
    let api = api(http.clone());

    api.set_presence(true, None).await.unwrap();
    api.set_presence(false, Some("busy")).await.unwrap();

    let bodies = http.bodies("presence/setpresence");
    assert_eq!(bodies[0][1], json!([720, 40]));
    assert_eq!(bodies[0].as_array().unwrap().len(), 2);
    assert_eq!(bodies[1][1], json!([720, 30]));
    assert_eq!(bodies[1][7], json!([[[[[0, "busy"]]]]]));
}

#[tokio::test]
async fn timestamped_requests_use_microseconds() {
    let http = RecordingHttp::ok();
    let api = api(http.clone());
    let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

    api.sync_all_new_events(at).await.unwrap();
    api.get_conversation("conv", at, 50).await.unwrap();
    api.update_watermark("conv", at).await.unwrap();

    let micros = at.timestamp_micros();
    let sync = &http.bodies("conversations/syncallnewevents")[0];
    assert_eq!(sync[1], json!(micros));
    assert_eq!(sync[7], json!(1_048_576));

    let get = &http.bodies("conversations/getconversation")[0];
    assert_eq!(get[1], json!([["conv"]]));
    assert_eq!(get[3], json!(true));
    assert_eq!(get[5], json!(50));
    assert_eq!(get[6], json!([null, null, micros]));

    let watermark = &http.bodies("conversations/updatewatermark")[0];
    assert_eq!(watermark[2], json!(micros));
}

#[tokio::test]
async fn catalog_endpoints() {
    let http = RecordingHttp::ok();
    let api = api(http.clone());
    let otr = OffTheRecordStatus::OnTheRecord;

    api.get_entity_by_id(&["g1", "g2"]).await.unwrap();
    api.rename_conversation("conv", "New name", otr).await.unwrap();
    api.remove_user("conv", otr).await.unwrap();
    api.query_presence("g1").await.unwrap();
    api.sync_recent_conversations(100, 1).await.unwrap();
    api.set_conversation_notification_level("conv", NotificationLevel::Quiet)
        .await
        .unwrap();
    api.easter_egg("conv", "ponies").await.unwrap();
    api.add_user("conv", &["g3"], otr).await.unwrap();

    assert_eq!(
        http.endpoints(),
        vec![
            "contacts/getentitybyid",
            "conversations/renameconversation",
            "conversations/removeuser",
            "presence/querypresence",
            "conversations/syncrecentconversations",
            "conversations/setconversationnotificationlevel",
            "conversations/easteregg",
            "conversations/adduser",
        ]
    );

    assert_eq!(
        http.bodies("contacts/getentitybyid")[0][2],
        json!([["g1"], ["g2"]])
    );
    let rename = &http.bodies("conversations/renameconversation")[0];
    assert_eq!(rename[2], json!("New name"));
    assert_eq!(rename[4], json!([["conv"], 42, 2]));
    assert_eq!(
        http.bodies("conversations/removeuser")[0][4],
        json!([["conv"], 43, 2])
    );
    let presence = &http.bodies("presence/querypresence")[0];
    assert_eq!(presence[1], json!([["g1"]]));
    assert_eq!(presence[2], json!([1, 2, 7]));
    let recent = &http.bodies("conversations/syncrecentconversations")[0];
    assert_eq!(recent[2], json!(100));
    assert_eq!(recent[3], json!(1));
    assert_eq!(recent[4], json!([1]));
    assert_eq!(
        http.bodies("conversations/setconversationnotificationlevel")[0][2],
        json!(10)
    );
    assert_eq!(
        http.bodies("conversations/easteregg")[0][2],
        json!(["ponies"])
    );
    let add = &http.bodies("conversations/adduser")[0];
    assert_eq!(add[2], json!([["g3"]]));
    assert_eq!(add[4], json!([["conv"], 44, 2]));
}
