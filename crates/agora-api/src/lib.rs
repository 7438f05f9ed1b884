pub mod channels;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod pins;
pub mod stamps;
pub mod state;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};

use crate::middleware::require_auth;
use crate::state::AppState;

/// Every route requires a bearer token.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/messages", get(messages::get_messages))
        .route(
            "/messages/{message_id}",
            get(messages::get_message)
                .put(messages::edit_message)
                .delete(messages::delete_message),
        )
        .route(
            "/messages/{message_id}/pin",
            post(pins::pin_message).delete(pins::unpin_message),
        )
        .route(
            "/messages/{message_id}/stamps/{stamp_id}",
            post(stamps::add_stamp).delete(stamps::remove_stamp),
        )
        .route("/channels", post(channels::create_channel))
        .route(
            "/channels/{channel_id}/messages",
            get(messages::get_channel_messages).post(messages::post_message),
        )
        .route(
            "/channels/{channel_id}/archive",
            put(channels::archive_channel).delete(channels::unarchive_channel),
        )
        .route(
            "/channels/{channel_id}/subscription",
            put(channels::subscribe_channel),
        )
        .route(
            "/channels/{channel_id}/events",
            get(channels::list_channel_events),
        )
        .route(
            "/users/{user_id}/messages",
            post(messages::post_direct_message),
        )
        .layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use http_body_util::BodyExt;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use agora_channel::ChannelTree;
    use agora_db::Database;
    use agora_message::{ManagerConfig, MessageManager};
    use agora_types::api::Claims;
    use agora_types::models::GENERAL_CHANNEL_ID;

    use super::*;
    use crate::state::AppStateInner;

    const SECRET: &str = "test-secret";

    fn app() -> Router {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let channels = Arc::new(ChannelTree::load(db.clone()).unwrap());
        let messages =
            MessageManager::new(db.clone(), channels.clone(), ManagerConfig::default()).unwrap();
        router(Arc::new(AppStateInner {
            messages,
            channels,
            db,
            jwt_secret: SECRET.into(),
        }))
    }

    fn token(user: Uuid) -> String {
        let claims = Claims {
            sub: user,
            username: "tester".into(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        user: Uuid,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
        let body = match body {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };

        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn requests_without_a_token_are_rejected() {
        let app = app();
        let res = app
            .oneshot(
                Request::builder()
                    .uri(format!("/messages/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn post_then_read_back() {
        let app = app();
        let user = Uuid::new_v4();

        let (status, created) = call(
            &app,
            Method::POST,
            &format!("/channels/{}/messages", GENERAL_CHANNEL_ID),
            user,
            Some(json!({ "content": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["user_id"], json!(user));

        let (status, read) = call(
            &app,
            Method::GET,
            &format!("/messages/{}", created["id"].as_str().unwrap()),
            user,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(read["content"], "hello");
        assert_eq!(read["pinned"], false);
    }

    #[tokio::test]
    async fn unknown_message_is_404() {
        let app = app();
        let (status, body) = call(
            &app,
            Method::GET,
            &format!("/messages/{}", Uuid::new_v4()),
            Uuid::new_v4(),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not found");
    }

    #[tokio::test]
    async fn archived_channel_blocks_unpin() {
        let app = app();
        let user = Uuid::new_v4();

        let (_, channel) = call(
            &app,
            Method::POST,
            "/channels",
            user,
            Some(json!({ "name": "launch" })),
        )
        .await;
        let channel_id = channel["id"].as_str().unwrap().to_string();

        let (_, message) = call(
            &app,
            Method::POST,
            &format!("/channels/{}/messages", channel_id),
            user,
            Some(json!({ "content": "liftoff" })),
        )
        .await;
        let message_id = message["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/messages/{}/pin", message_id),
            user,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/messages/{}/pin", message_id),
            user,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, timeline) = call(
            &app,
            Method::GET,
            &format!("/channels/{}/messages", channel_id),
            user,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(timeline["more"], false);
        assert_eq!(timeline["messages"][0]["pinned"], true);

        let (status, _) = call(
            &app,
            Method::PUT,
            &format!("/channels/{}/archive", channel_id),
            user,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = call(
            &app,
            Method::DELETE,
            &format!("/messages/{}/pin", message_id),
            user,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({ "error": "channel archived" }));

        let (_, read) = call(
            &app,
            Method::GET,
            &format!("/messages/{}", message_id),
            user,
            None,
        )
        .await;
        assert_eq!(read["pinned"], true);

        let (status, events) = call(
            &app,
            Method::GET,
            &format!("/channels/{}/events", channel_id),
            user,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(events["events"][0]["event_type"], "archive_changed");
    }

    #[tokio::test]
    async fn only_the_author_may_edit() {
        let app = app();
        let (author, other) = (Uuid::new_v4(), Uuid::new_v4());

        let (_, message) = call(
            &app,
            Method::POST,
            &format!("/channels/{}/messages", GENERAL_CHANNEL_ID),
            author,
            Some(json!({ "content": "mine" })),
        )
        .await;
        let uri = format!("/messages/{}", message["id"].as_str().unwrap());

        let (status, _) = call(
            &app,
            Method::PUT,
            &uri,
            other,
            Some(json!({ "content": "yours" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &app,
            Method::PUT,
            &uri,
            author,
            Some(json!({ "content": "still mine" })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, read) = call(&app, Method::GET, &uri, other, None).await;
        assert_eq!(read["content"], "still mine");
    }

    #[tokio::test]
    async fn stamps_default_to_one_and_accumulate() {
        let app = app();
        let user = Uuid::new_v4();
        let stamp = Uuid::new_v4();

        let (_, message) = call(
            &app,
            Method::POST,
            &format!("/channels/{}/messages", GENERAL_CHANNEL_ID),
            user,
            Some(json!({ "content": "react to me" })),
        )
        .await;
        let id = message["id"].as_str().unwrap().to_string();
        let stamp_uri = format!("/messages/{}/stamps/{}", id, stamp);

        let (status, _) = call(&app, Method::POST, &stamp_uri, user, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(
            &app,
            Method::POST,
            &stamp_uri,
            user,
            Some(json!({ "count": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, read) = call(&app, Method::GET, &format!("/messages/{}", id), user, None).await;
        assert_eq!(read["stamps"][0]["count"], 3);

        let (status, _) = call(
            &app,
            Method::POST,
            &stamp_uri,
            user,
            Some(json!({ "count": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::DELETE, &stamp_uri, user, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, read) = call(&app, Method::GET, &format!("/messages/{}", id), user, None).await;
        assert_eq!(read["stamps"], json!([]));
    }

    #[tokio::test]
    async fn direct_messages_are_excluded_on_request() {
        let app = app();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/users/{}/messages", bob),
            alice,
            Some(json!({ "content": "psst" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, all) = call(
            &app,
            Method::GET,
            &format!("/messages?user={}", alice),
            alice,
            None,
        )
        .await;
        assert_eq!(all["messages"].as_array().unwrap().len(), 1);

        let (_, public_only) = call(
            &app,
            Method::GET,
            &format!("/messages?user={}&exclude_dms=true", alice),
            alice,
            None,
        )
        .await;
        assert!(public_only["messages"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn direct_messages_are_hidden_from_outsiders() {
        let app = app();
        let (alice, bob, eve) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let (_, dm) = call(
            &app,
            Method::POST,
            &format!("/users/{}/messages", bob),
            alice,
            Some(json!({ "content": "psst" })),
        )
        .await;
        let message_uri = format!("/messages/{}", dm["id"].as_str().unwrap());
        let channel_uri = format!("/channels/{}", dm["channel_id"].as_str().unwrap());

        let (status, read) = call(&app, Method::GET, &message_uri, bob, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(read["content"], "psst");

        let (status, _) = call(&app, Method::GET, &message_uri, eve, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, all) = call(&app, Method::GET, "/messages", eve, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(all["messages"].as_array().unwrap().is_empty());

        let (status, _) = call(
            &app,
            Method::GET,
            &format!("{}/messages", channel_uri),
            eve,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("{}/messages", channel_uri),
            eve,
            Some(json!({ "content": "let me in" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, Method::GET, &format!("{}/events", channel_uri), eve, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, Method::POST, &format!("{}/pin", message_uri), eve, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let stamp_uri = format!("{}/stamps/{}", message_uri, Uuid::new_v4());
        let (status, _) = call(&app, Method::POST, &stamp_uri, eve, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, Method::DELETE, &message_uri, eve, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Members still see it in the global timeline
        let (_, all) = call(&app, Method::GET, "/messages", bob, None).await;
        assert_eq!(all["messages"].as_array().unwrap().len(), 1);
    }
}
