use crate::server::{Result, ServerError, ServerRouter, json::Json};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use tokio::sync::watch;
use twitscrape_common::model::{
    Id,
    post::{Post, PostMarker},
};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_posts)
        .typed_get(get_post)
}

#[derive(TypedPath)]
#[typed_path("/")]
struct ListPostsPath;

/// Every post received so far, oldest first.
async fn list_posts(
    ListPostsPath: ListPostsPath,
    State(posts): State<watch::Receiver<Vec<Post>>>,
) -> Json<Vec<Post>> {
    Json(posts.borrow().clone())
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}", rejection(ServerError))]
struct GetPostPath {
    id: Id<PostMarker>,
}

async fn get_post(
    GetPostPath { id }: GetPostPath,
    State(posts): State<watch::Receiver<Vec<Post>>>,
) -> Result<Json<Post>> {
    let post = posts
        .borrow()
        .iter()
        .find(|post| post.id == id)
        .cloned()
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(post))
}
