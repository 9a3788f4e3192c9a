use axum::{
    extract::{Form, Path, Query, State},
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::{
    app_state::AppState,
    error::{redirect_found, AppError, AppResult},
    forms::{CommentForm, PostForm},
    models::Post,
    page_cache::INDEX_PAGE_KEY,
    pagination::{PageInfo, Paginator, PAGE_SIZE},
    viewer::Viewer,
};

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// Raw so a junk value clamps to page one instead of failing extraction.
    pub page: Option<String>,
}

fn page_context(paginator: &Paginator, page: &PageInfo, posts: &[Post]) -> (Value, Value) {
    let page_value = json!({
        "number": page.number,
        "has_next": page.has_next,
        "has_previous": page.has_previous,
        "object_list": posts,
    });
    let paginator_value = json!({
        "count": paginator.count,
        "per_page": paginator.per_page,
        "num_pages": paginator.num_pages,
    });
    (page_value, paginator_value)
}

/// GET /: newest posts across all authors. The rendered fragment is cached
/// under a fixed key and refreshed only by TTL expiry, never by writes.
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    if let Some(cached) = state.cache.get(INDEX_PAGE_KEY).await {
        return Ok(Html(cached).into_response());
    }

    let count = state.storage.count_posts().await?;
    let paginator = Paginator::new(count, PAGE_SIZE);
    let page = paginator.get_page(query.page.as_deref());
    let posts = state
        .storage
        .list_posts(paginator.per_page, paginator.offset(&page))
        .await?;

    let (page_value, paginator_value) = page_context(&paginator, &page, &posts);
    let html = state.renderer.render(
        "index.html",
        &json!({ "page": page_value, "paginator": paginator_value }),
    );

    state.cache.insert(INDEX_PAGE_KEY, html.clone()).await;
    Ok(Html(html).into_response())
}

/// GET /group/{slug}/: posts attached to one group.
pub async fn group_posts(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let group = state
        .storage
        .get_group_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("group '{}'", slug)))?;

    let count = state.storage.count_group_posts(group.id).await?;
    let paginator = Paginator::new(count, PAGE_SIZE);
    let page = paginator.get_page(query.page.as_deref());
    let posts = state
        .storage
        .list_group_posts(group.id, paginator.per_page, paginator.offset(&page))
        .await?;

    let (page_value, paginator_value) = page_context(&paginator, &page, &posts);
    let html = state.renderer.render(
        "group.html",
        &json!({
            "group": group,
            "page": page_value,
            "paginator": paginator_value,
        }),
    );
    Ok(Html(html).into_response())
}

/// GET /new/: empty post form.
pub async fn new_post_form(State(state): State<AppState>, viewer: Viewer) -> AppResult<Response> {
    viewer.require()?;
    let html = state.renderer.render(
        "new_post.html",
        &json!({ "form": PostForm::empty_context(), "is_new": true }),
    );
    Ok(Html(html).into_response())
}

/// POST /new/: create a post authored by the current user.
pub async fn new_post(
    State(state): State<AppState>,
    viewer: Viewer,
    Form(form): Form<PostForm>,
) -> AppResult<Response> {
    let user = viewer.require()?.clone();

    let draft = match form.validate(&state.storage).await? {
        Ok(draft) => draft,
        Err(errors) => {
            let html = state.renderer.render(
                "new_post.html",
                &json!({ "form": form.to_context(&errors), "is_new": true }),
            );
            return Ok(Html(html).into_response());
        }
    };

    let image_path = match draft.image {
        Some((bytes, format)) => Some(
            state
                .media
                .store_post_image(&bytes, format)
                .await
                .map_err(|e| AppError::Internal(format!("storing image: {}", e)))?,
        ),
        None => None,
    };

    let post = state
        .storage
        .create_post(user.id, &draft.text, draft.group_id, image_path.as_deref())
        .await?;
    info!("Created post {} by {}", post.id, user.username);

    Ok(redirect_found("/"))
}

/// GET /{username}/: an author's posts plus whether the viewer follows them.
pub async fn profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
    viewer: Viewer,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let author = state
        .storage
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user '{}'", username)))?;

    let count = state.storage.count_author_posts(author.id).await?;
    let paginator = Paginator::new(count, PAGE_SIZE);
    let page = paginator.get_page(query.page.as_deref());
    let posts = state
        .storage
        .list_author_posts(author.id, paginator.per_page, paginator.offset(&page))
        .await?;

    let following = match &viewer.user {
        Some(user) => state.storage.is_following(user.id, author.id).await?,
        None => false,
    };

    let (page_value, paginator_value) = page_context(&paginator, &page, &posts);
    let html = state.renderer.render(
        "profile.html",
        &json!({
            "author": author,
            "page": page_value,
            "paginator": paginator_value,
            "following": following,
        }),
    );
    Ok(Html(html).into_response())
}

/// GET /{username}/{post_id}/: one post, its comments, an empty comment form.
pub async fn post_view(
    State(state): State<AppState>,
    Path((username, post_id)): Path<(String, i64)>,
) -> AppResult<Response> {
    let post = state
        .storage
        .get_post(&username, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("post {} by '{}'", post_id, username)))?;
    let comments = state.storage.list_comments(post.id).await?;

    let html = state.renderer.render(
        "post.html",
        &json!({
            "author": { "username": post.author_username },
            "post": post,
            "comments": comments,
            "form": CommentForm::empty_context(),
        }),
    );
    Ok(Html(html).into_response())
}

async fn owned_post(
    state: &AppState,
    viewer: &Viewer,
    username: &str,
    post_id: i64,
) -> AppResult<Post> {
    let user = viewer.require()?;
    let post = state
        .storage
        .get_post(username, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("post {} by '{}'", post_id, username)))?;
    // Only the author may edit; anyone else sees the post as missing.
    if post.author_id != user.id {
        return Err(AppError::NotFound(format!(
            "post {} by '{}'",
            post_id, username
        )));
    }
    Ok(post)
}

/// GET /{username}/{post_id}/edit/: post form pre-filled from the post.
pub async fn post_edit_form(
    State(state): State<AppState>,
    Path((username, post_id)): Path<(String, i64)>,
    viewer: Viewer,
) -> AppResult<Response> {
    let post = owned_post(&state, &viewer, &username, post_id).await?;

    let html = state.renderer.render(
        "new_post.html",
        &json!({
            "form": {
                "values": { "text": post.text, "group": post.group_slug },
                "errors": {},
            },
            "post": post,
            "is_new": false,
        }),
    );
    Ok(Html(html).into_response())
}

/// POST /{username}/{post_id}/edit/: update text/group (and image if sent).
pub async fn post_edit(
    State(state): State<AppState>,
    Path((username, post_id)): Path<(String, i64)>,
    viewer: Viewer,
    Form(form): Form<PostForm>,
) -> AppResult<Response> {
    let post = owned_post(&state, &viewer, &username, post_id).await?;

    let draft = match form.validate(&state.storage).await? {
        Ok(draft) => draft,
        Err(errors) => {
            let html = state.renderer.render(
                "new_post.html",
                &json!({
                    "form": form.to_context(&errors),
                    "post": post,
                    "is_new": false,
                }),
            );
            return Ok(Html(html).into_response());
        }
    };

    let image_path = match draft.image {
        Some((bytes, format)) => Some(
            state
                .media
                .store_post_image(&bytes, format)
                .await
                .map_err(|e| AppError::Internal(format!("storing image: {}", e)))?,
        ),
        None => None,
    };

    state
        .storage
        .update_post(post.id, &draft.text, draft.group_id, image_path.as_deref())
        .await?;
    info!("Updated post {} by {}", post.id, username);

    Ok(redirect_found(&format!("/{}/{}/", username, post_id)))
}

/// POST /{username}/{post_id}/comment/: attach a comment as the current user.
pub async fn add_comment(
    State(state): State<AppState>,
    Path((username, post_id)): Path<(String, i64)>,
    viewer: Viewer,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    let user = viewer.require()?.clone();
    let post = state
        .storage
        .get_post(&username, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("post {} by '{}'", post_id, username)))?;

    let text = match form.validate() {
        Ok(text) => text,
        Err(errors) => {
            let comments = state.storage.list_comments(post.id).await?;
            let html = state.renderer.render(
                "post.html",
                &json!({
                    "author": { "username": post.author_username },
                    "post": post,
                    "comments": comments,
                    "form": form.to_context(&errors),
                }),
            );
            return Ok(Html(html).into_response());
        }
    };

    let comment = state.storage.create_comment(post.id, user.id, &text).await?;
    info!(
        "Comment {} on post {} by {}",
        comment.id, post.id, user.username
    );

    Ok(redirect_found(&format!("/{}/{}/", username, post_id)))
}

/// GET /follow/: posts from authors the current user follows.
pub async fn follow_index(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let user = viewer.require()?.clone();

    let count = state.storage.count_feed_posts(user.id).await?;
    let paginator = Paginator::new(count, PAGE_SIZE);
    let page = paginator.get_page(query.page.as_deref());
    let posts = state
        .storage
        .list_feed_posts(user.id, paginator.per_page, paginator.offset(&page))
        .await?;

    let (page_value, paginator_value) = page_context(&paginator, &page, &posts);
    let html = state.renderer.render(
        "follow.html",
        &json!({ "page": page_value, "paginator": paginator_value }),
    );
    Ok(Html(html).into_response())
}

/// GET /{username}/follow/: start following; self-follow silently no-ops.
pub async fn profile_follow(
    State(state): State<AppState>,
    Path(username): Path<String>,
    viewer: Viewer,
) -> AppResult<Response> {
    let user = viewer.require()?.clone();
    let author = state
        .storage
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user '{}'", username)))?;

    if author.id != user.id {
        let created = state.storage.follow(user.id, author.id).await?;
        if created {
            info!("{} now follows {}", user.username, author.username);
        }
    }

    Ok(redirect_found(&format!("/{}/", username)))
}

/// GET /{username}/unfollow/: stop following; missing row is a no-op.
pub async fn profile_unfollow(
    State(state): State<AppState>,
    Path(username): Path<String>,
    viewer: Viewer,
) -> AppResult<Response> {
    let user = viewer.require()?.clone();
    let author = state
        .storage
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user '{}'", username)))?;

    let removed = state.storage.unfollow(user.id, author.id).await?;
    if removed {
        info!("{} unfollowed {}", user.username, author.username);
    }

    Ok(redirect_found(&format!("/{}/", username)))
}

/// Fallback for unmatched paths.
pub async fn page_not_found(State(state): State<AppState>, uri: Uri) -> Response {
    let html = state
        .renderer
        .render("misc/404.html", &json!({ "path": uri.path() }));
    (StatusCode::NOT_FOUND, Html(html)).into_response()
}
