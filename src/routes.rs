use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{app_state::AppState, handlers};

/// URL table. Path parameter names (`slug`, `username`, `post_id`) are part
/// of the handler contract.
pub fn router(state: AppState) -> Router {
    let media_root = state.config.media.root.clone();

    Router::new()
        .route("/", get(handlers::index))
        .route(
            "/new/",
            get(handlers::new_post_form).post(handlers::new_post),
        )
        .route("/follow/", get(handlers::follow_index))
        .route("/group/{slug}/", get(handlers::group_posts))
        .route("/{username}/", get(handlers::profile))
        .route("/{username}/follow/", get(handlers::profile_follow))
        .route("/{username}/unfollow/", get(handlers::profile_unfollow))
        .route("/{username}/{post_id}/", get(handlers::post_view))
        .route(
            "/{username}/{post_id}/edit/",
            get(handlers::post_edit_form).post(handlers::post_edit),
        )
        .route("/{username}/{post_id}/comment/", post(handlers::add_comment))
        .fallback(handlers::page_not_found)
        .nest_service("/media", ServeDir::new(media_root))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
