use axum::response::Html;

const INDEX_HTML: &str = include_str!("../templates/index.html");

/// Render the index page with the configured strategy shown in the footer.
pub fn render_index(strategy: &str) -> Html<String> {
    Html(INDEX_HTML.replace("{{ strategy }}", strategy))
}
