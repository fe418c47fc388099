use crate::page::{render, PageView};
use axum::response::Html;

pub async fn index() -> Html<String> {
    Html(render(&PageView::default()))
}
