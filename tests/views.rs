use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tower::ServiceExt;

use scribe::config::{CacheConfig, Config, DatabaseConfig, MediaConfig, ServerConfig};
use scribe::page_cache::INDEX_PAGE_KEY;
use scribe::routes::router;
use scribe::AppState;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

async fn test_state() -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
        },
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        cache: CacheConfig {
            ttl_secs: 20,
            capacity: 16,
        },
        media: MediaConfig {
            root: dir.path().to_string_lossy().into_owned(),
        },
    };
    let state = AppState::new(config).await.unwrap();
    (state, dir)
}

fn get_request(path: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(path);
    if let Some(user) = user {
        builder = builder.header(header::COOKIE, format!("session_user={}", user));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_request(path: &str, user: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(user) = user {
        builder = builder.header(header::COOKIE, format!("session_user={}", user));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let location = response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, location, String::from_utf8(bytes.to_vec()).unwrap())
}

// The form layer carries the optional image as base64, which uses characters
// that need escaping in a urlencoded body.
fn urlencode(s: &str) -> String {
    s.replace('%', "%25")
        .replace('+', "%2B")
        .replace('/', "%2F")
        .replace('=', "%3D")
        .replace(' ', "+")
}

#[tokio::test]
async fn creating_post_shows_up_on_all_read_views() {
    let (state, _dir) = test_state().await;
    state.storage.create_user("alice").await.unwrap();
    let app = router(state.clone());

    let (status, location, _) =
        send(&app, post_request("/new/", Some("alice"), "text=hello+world")).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location.as_deref(), Some("/"));
    assert_eq!(state.storage.count_posts().await.unwrap(), 1);

    let post = &state.storage.list_posts(10, 0).await.unwrap()[0];

    state.cache.purge(INDEX_PAGE_KEY).await;
    let (status, _, body) = send(&app, get_request("/", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("hello world"));
    assert!(body.contains(&format!("data-id=\"{}\"", post.id)));

    let (_, _, body) = send(&app, get_request("/alice/", None)).await;
    assert!(body.contains("hello world"));

    let (status, _, body) =
        send(&app, get_request(&format!("/alice/{}/", post.id), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("hello world"));
}

#[tokio::test]
async fn gated_paths_redirect_anonymous_viewers_to_login() {
    let (state, _dir) = test_state().await;
    let alice = state.storage.create_user("alice").await.unwrap();
    let post = state
        .storage
        .create_post(alice.id, "a post", None, None)
        .await
        .unwrap();
    let app = router(state.clone());

    let (status, location, _) = send(&app, get_request("/new/", None)).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location.as_deref(), Some("/auth/login/?next=/new/"));

    let (status, location, _) = send(&app, get_request("/follow/", None)).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location.as_deref(), Some("/auth/login/?next=/follow/"));

    // Anonymous comment submissions never reach persistence
    let path = format!("/alice/{}/comment/", post.id);
    let (status, location, _) = send(&app, post_request(&path, None, "text=sneaky")).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(
        location.as_deref(),
        Some(format!("/auth/login/?next={}", path).as_str())
    );
    assert_eq!(state.storage.count_comments(post.id).await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_targets_return_404() {
    let (state, _dir) = test_state().await;
    let alice = state.storage.create_user("alice").await.unwrap();
    let app = router(state.clone());

    let (status, _, body) = send(&app, get_request("/no/such/path/", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("/no/such/path/"));

    let (status, _, _) = send(&app, get_request("/group/nope/", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&app, get_request("/stranger/", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Existing post id under the wrong author is a mismatch, not a hit
    let post = state
        .storage
        .create_post(alice.id, "mine", None, None)
        .await
        .unwrap();
    state.storage.create_user("bob").await.unwrap();
    let (status, _, _) =
        send(&app, get_request(&format!("/bob/{}/", post.id), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn editing_a_post_is_reflected_after_cache_expiry() {
    let (state, _dir) = test_state().await;
    let alice = state.storage.create_user("alice").await.unwrap();
    state.storage.create_user("bob").await.unwrap();
    let post = state
        .storage
        .create_post(alice.id, "original", None, None)
        .await
        .unwrap();
    let app = router(state.clone());

    let path = format!("/alice/{}/edit/", post.id);
    let (status, location, _) =
        send(&app, post_request(&path, Some("alice"), "text=updated")).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location.as_deref(), Some(format!("/alice/{}/", post.id).as_str()));

    state.cache.purge(INDEX_PAGE_KEY).await;
    let (_, _, body) = send(&app, get_request("/", None)).await;
    assert!(body.contains("updated"));
    assert!(!body.contains("original"));

    let (_, _, body) = send(&app, get_request("/alice/", None)).await;
    assert!(body.contains("updated"));
    let (_, _, body) =
        send(&app, get_request(&format!("/alice/{}/", post.id), None)).await;
    assert!(body.contains("updated"));

    // Someone else editing alice's post sees a 404
    let (status, _, _) = send(&app, post_request(&path, Some("bob"), "text=hijack")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let fresh = state.storage.get_post_by_id(post.id).await.unwrap().unwrap();
    assert_eq!(fresh.text, "updated");
}

#[tokio::test]
async fn invalid_edit_form_rerenders_without_saving() {
    let (state, _dir) = test_state().await;
    let alice = state.storage.create_user("alice").await.unwrap();
    let post = state
        .storage
        .create_post(alice.id, "original", None, None)
        .await
        .unwrap();
    let app = router(state.clone());

    let path = format!("/alice/{}/edit/", post.id);
    let (status, _, body) = send(&app, post_request(&path, Some("alice"), "text=")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("data-field=\"text\""));

    let fresh = state.storage.get_post_by_id(post.id).await.unwrap().unwrap();
    assert_eq!(fresh.text, "original");
}

#[tokio::test]
async fn editing_a_post_can_attach_an_image() {
    let (state, _dir) = test_state().await;
    let alice = state.storage.create_user("alice").await.unwrap();
    let post = state
        .storage
        .create_post(alice.id, "no picture yet", None, None)
        .await
        .unwrap();
    let app = router(state.clone());

    let body = format!(
        "text=now+with+picture&image={}",
        urlencode(&BASE64.encode(PNG))
    );
    let path = format!("/alice/{}/edit/", post.id);
    let (status, location, _) = send(&app, post_request(&path, Some("alice"), &body)).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location.as_deref(), Some(format!("/alice/{}/", post.id).as_str()));

    let fresh = state.storage.get_post_by_id(post.id).await.unwrap().unwrap();
    assert_eq!(fresh.text, "now with picture");
    let image = fresh.image.as_deref().unwrap();
    assert!(image.starts_with("posts/"));

    let (_, _, body) = send(&app, get_request(&format!("/alice/{}/", post.id), None)).await;
    assert!(body.contains(&format!("<img src=\"/media/{}\"", image)));
}

#[tokio::test]
async fn media_store_failure_surfaces_the_500_page() {
    let (state, dir) = test_state().await;
    state.storage.create_user("alice").await.unwrap();

    // Point the media root at a regular file so the image write cannot
    // create its posts/ directory
    let blocked = dir.path().join("blocked");
    std::fs::write(&blocked, b"not a directory").unwrap();
    let mut config = state.config.clone();
    config.media.root = blocked.to_string_lossy().into_owned();
    let state = scribe::AppState {
        media: std::sync::Arc::new(scribe::media::MediaStore::new(&config.media.root)),
        config,
        ..state
    };
    let app = router(state.clone());

    let body = format!(
        "text=doomed+upload&image={}",
        urlencode(&BASE64.encode(PNG))
    );
    let (status, _, page) = send(&app, post_request("/new/", Some("alice"), &body)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(page.contains("500 Server Error"));
    assert_eq!(state.storage.count_posts().await.unwrap(), 0);
}

#[tokio::test]
async fn invalid_post_form_rerenders_with_errors() {
    let (state, _dir) = test_state().await;
    state.storage.create_user("alice").await.unwrap();
    let app = router(state.clone());

    let (status, _, body) = send(&app, post_request("/new/", Some("alice"), "text=")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("data-field=\"text\""));
    assert_eq!(state.storage.count_posts().await.unwrap(), 0);

    let (status, _, body) = send(
        &app,
        post_request("/new/", Some("alice"), "text=hi&group=ghost"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("data-field=\"group\""));
    assert_eq!(state.storage.count_posts().await.unwrap(), 0);
}

#[tokio::test]
async fn image_posts_render_an_image_on_all_read_views() {
    let (state, _dir) = test_state().await;
    state.storage.create_user("alice").await.unwrap();
    let app = router(state.clone());

    let body = format!(
        "text=with+picture&image={}",
        urlencode(&BASE64.encode(PNG))
    );
    let (status, _, _) = send(&app, post_request("/new/", Some("alice"), &body)).await;
    assert_eq!(status, StatusCode::FOUND);

    let post = &state.storage.list_posts(10, 0).await.unwrap()[0];
    let image = post.image.as_deref().unwrap();
    assert!(image.starts_with("posts/"));

    state.cache.purge(INDEX_PAGE_KEY).await;
    let (_, _, index) = send(&app, get_request("/", None)).await;
    let (_, _, profile) = send(&app, get_request("/alice/", None)).await;
    let (_, _, single) =
        send(&app, get_request(&format!("/alice/{}/", post.id), None)).await;
    for view in [&index, &profile, &single] {
        assert!(view.contains(&format!("<img src=\"/media/{}\"", image)));
    }
}

#[tokio::test]
async fn index_cache_serves_stale_content_until_purged() {
    let (state, _dir) = test_state().await;
    let alice = state.storage.create_user("alice").await.unwrap();
    state
        .storage
        .create_post(alice.id, "first post", None, None)
        .await
        .unwrap();
    let app = router(state.clone());

    let (_, _, first_read) = send(&app, get_request("/", None)).await;
    assert!(first_read.contains("first post"));

    state
        .storage
        .create_post(alice.id, "second post", None, None)
        .await
        .unwrap();

    // Within the TTL the cached fragment is returned unchanged
    let (_, _, second_read) = send(&app, get_request("/", None)).await;
    assert_eq!(first_read, second_read);
    assert!(!second_read.contains("second post"));

    state.cache.purge(INDEX_PAGE_KEY).await;
    let (_, _, third_read) = send(&app, get_request("/", None)).await;
    assert!(third_read.contains("second post"));
}

#[tokio::test]
async fn follow_unfollow_roundtrip_and_idempotency() {
    let (state, _dir) = test_state().await;
    let alice = state.storage.create_user("alice").await.unwrap();
    state.storage.create_user("bob").await.unwrap();
    let app = router(state.clone());

    let (status, location, _) = send(&app, get_request("/bob/follow/", Some("alice"))).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location.as_deref(), Some("/bob/"));
    assert_eq!(state.storage.following_count(alice.id).await.unwrap(), 1);

    // Following twice never creates a second row
    send(&app, get_request("/bob/follow/", Some("alice"))).await;
    assert_eq!(state.storage.following_count(alice.id).await.unwrap(), 1);

    // Self-follow is silently skipped
    send(&app, get_request("/alice/follow/", Some("alice"))).await;
    assert_eq!(state.storage.following_count(alice.id).await.unwrap(), 1);

    let (status, location, _) = send(&app, get_request("/bob/unfollow/", Some("alice"))).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location.as_deref(), Some("/bob/"));
    assert_eq!(state.storage.following_count(alice.id).await.unwrap(), 0);

    // Unfollowing when not following is a no-op
    send(&app, get_request("/bob/unfollow/", Some("alice"))).await;
    assert_eq!(state.storage.following_count(alice.id).await.unwrap(), 0);
}

#[tokio::test]
async fn feed_contains_followed_authors_only() {
    let (state, _dir) = test_state().await;
    let alice = state.storage.create_user("alice").await.unwrap();
    let bob = state.storage.create_user("bob").await.unwrap();
    let carol = state.storage.create_user("carol").await.unwrap();
    state
        .storage
        .create_post(bob.id, "bob speaks", None, None)
        .await
        .unwrap();
    state
        .storage
        .create_post(carol.id, "carol speaks", None, None)
        .await
        .unwrap();
    state.storage.follow(alice.id, bob.id).await.unwrap();
    let app = router(state.clone());

    let (status, _, body) = send(&app, get_request("/follow/", Some("alice"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("bob speaks"));
    assert!(!body.contains("carol speaks"));
}

#[tokio::test]
async fn profile_reports_whether_viewer_follows_author() {
    let (state, _dir) = test_state().await;
    let alice = state.storage.create_user("alice").await.unwrap();
    let bob = state.storage.create_user("bob").await.unwrap();
    state.storage.follow(alice.id, bob.id).await.unwrap();
    let app = router(state.clone());

    let (_, _, body) = send(&app, get_request("/bob/", Some("alice"))).await;
    assert!(body.contains("data-following=\"true\""));

    let (_, _, body) = send(&app, get_request("/bob/", None)).await;
    assert!(body.contains("data-following=\"false\""));

    let (_, _, body) = send(&app, get_request("/bob/", Some("bob"))).await;
    assert!(body.contains("data-following=\"false\""));
}

#[tokio::test]
async fn comments_require_auth_and_non_empty_text() {
    let (state, _dir) = test_state().await;
    let alice = state.storage.create_user("alice").await.unwrap();
    state.storage.create_user("bob").await.unwrap();
    let post = state
        .storage
        .create_post(alice.id, "discuss", None, None)
        .await
        .unwrap();
    let app = router(state.clone());
    let path = format!("/alice/{}/comment/", post.id);

    let (status, location, _) =
        send(&app, post_request(&path, Some("bob"), "text=good+point")).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location.as_deref(), Some(format!("/alice/{}/", post.id).as_str()));
    assert_eq!(state.storage.count_comments(post.id).await.unwrap(), 1);

    // Empty text re-renders the post page with the error, no insert
    let (status, _, body) = send(&app, post_request(&path, Some("bob"), "text=")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("data-field=\"text\""));
    assert_eq!(state.storage.count_comments(post.id).await.unwrap(), 1);

    // The comment shows on the post page
    let (_, _, body) = send(&app, get_request(&format!("/alice/{}/", post.id), None)).await;
    assert!(body.contains("good point"));
    assert!(body.contains("data-author=\"bob\""));
}

#[tokio::test]
async fn listings_paginate_at_ten_and_clamp_page_numbers() {
    let (state, _dir) = test_state().await;
    let alice = state.storage.create_user("alice").await.unwrap();
    for i in 0..11 {
        state
            .storage
            .create_post(alice.id, &format!("post number {}", i), None, None)
            .await
            .unwrap();
    }
    let app = router(state.clone());

    let (_, _, body) = send(&app, get_request("/alice/", None)).await;
    assert_eq!(body.matches("<article").count(), 10);
    assert!(body.contains("data-page=\"1\""));
    assert!(body.contains("data-pages=\"2\""));

    let (_, _, body) = send(&app, get_request("/alice/?page=2", None)).await;
    assert_eq!(body.matches("<article").count(), 1);
    // Newest-first: the oldest post lands alone on the last page
    assert!(body.contains("post number 0"));

    // Out-of-range and junk page numbers clamp instead of failing
    let (status, _, body) = send(&app, get_request("/alice/?page=99", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("data-page=\"2\""));

    let (status, _, body) = send(&app, get_request("/alice/?page=abc", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("data-page=\"1\""));
}

#[tokio::test]
async fn group_page_lists_only_group_posts() {
    let (state, _dir) = test_state().await;
    let alice = state.storage.create_user("alice").await.unwrap();
    let group = state
        .storage
        .create_group("Cats", "cats", "feline talk")
        .await
        .unwrap();
    state
        .storage
        .create_post(alice.id, "about cats", Some(group.id), None)
        .await
        .unwrap();
    state
        .storage
        .create_post(alice.id, "about dogs", None, None)
        .await
        .unwrap();
    let app = router(state.clone());

    let (status, _, body) = send(&app, get_request("/group/cats/", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Cats"));
    assert!(body.contains("about cats"));
    assert!(!body.contains("about dogs"));
}
