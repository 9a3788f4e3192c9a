use serde_json::Value;

/// Template seam. Handlers only promise a template name and context keys
/// (`page`, `paginator`, `group`, `author`, `post`, `comments`, `form`,
/// `following`, `path`); what the document looks like is up to the
/// implementation behind this trait.
pub trait Renderer: Send + Sync {
    fn render(&self, template: &str, context: &Value) -> String;
}

/// Default renderer: a minimal semantic HTML document built straight from
/// the context. Enough for the views to be read and asserted on without a
/// real template engine.
pub struct HtmlRenderer;

impl Renderer for HtmlRenderer {
    fn render(&self, template: &str, context: &Value) -> String {
        let mut body = String::new();

        if let Some(group) = context.get("group").filter(|v| !v.is_null()) {
            body.push_str(&format!(
                "<header class=\"group\"><h1>{}</h1><p>{}</p></header>",
                escape(str_of(group, "title")),
                escape(str_of(group, "description")),
            ));
        }

        if let Some(author) = context.get("author").filter(|v| !v.is_null()) {
            let following = context
                .get("following")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            body.push_str(&format!(
                "<header class=\"author\" data-following=\"{}\"><h1>{}</h1></header>",
                following,
                escape(str_of(author, "username")),
            ));
        }

        if let Some(form) = context.get("form").filter(|v| !v.is_null()) {
            body.push_str(&render_form(form));
        }

        if let Some(post) = context.get("post").filter(|v| !v.is_null()) {
            body.push_str(&render_post(post));
        }

        if let Some(page) = context.get("page").filter(|v| !v.is_null()) {
            if let Some(posts) = page.get("object_list").and_then(Value::as_array) {
                body.push_str("<section class=\"posts\">");
                for post in posts {
                    body.push_str(&render_post(post));
                }
                body.push_str("</section>");
            }
            body.push_str(&render_page_nav(page, context.get("paginator")));
        }

        if let Some(comments) = context.get("comments").and_then(Value::as_array) {
            body.push_str("<ul class=\"comments\">");
            for comment in comments {
                body.push_str(&format!(
                    "<li data-author=\"{}\">{}</li>",
                    escape(str_of(comment, "author_username")),
                    escape(str_of(comment, "text")),
                ));
            }
            body.push_str("</ul>");
        }

        if let Some(path) = context.get("path").and_then(Value::as_str) {
            body.push_str(&format!("<p class=\"path\">{}</p>", escape(path)));
        }

        format!(
            "<!doctype html><html><head><title>{}</title></head>\
             <body data-template=\"{}\">{}</body></html>",
            escape(template),
            escape(template),
            body
        )
    }
}

fn render_post(post: &Value) -> String {
    let mut article = format!(
        "<article class=\"post\" data-id=\"{}\"><p>{}</p>",
        post.get("id").and_then(Value::as_i64).unwrap_or(0),
        escape(str_of(post, "text")),
    );
    if let Some(image) = post.get("image").and_then(Value::as_str) {
        article.push_str(&format!("<img src=\"/media/{}\" alt=\"\">", escape(image)));
    }
    article.push_str(&format!(
        "<footer><a href=\"/{}/\">{}</a>",
        escape(str_of(post, "author_username")),
        escape(str_of(post, "author_username")),
    ));
    if let Some(slug) = post.get("group_slug").and_then(Value::as_str) {
        article.push_str(&format!(
            " in <a href=\"/group/{}/\">{}</a>",
            escape(slug),
            escape(slug)
        ));
    }
    article.push_str("</footer></article>");
    article
}

fn render_form(form: &Value) -> String {
    let mut block = String::from("<form method=\"post\">");
    if let Some(errors) = form.get("errors").and_then(Value::as_object) {
        if !errors.is_empty() {
            block.push_str("<ul class=\"errors\">");
            for (field, message) in errors {
                block.push_str(&format!(
                    "<li data-field=\"{}\">{}</li>",
                    escape(field),
                    escape(message.as_str().unwrap_or("")),
                ));
            }
            block.push_str("</ul>");
        }
    }
    if let Some(values) = form.get("values").and_then(Value::as_object) {
        for (field, value) in values {
            block.push_str(&format!(
                "<textarea name=\"{}\">{}</textarea>",
                escape(field),
                escape(value.as_str().unwrap_or("")),
            ));
        }
    }
    block.push_str("</form>");
    block
}

fn render_page_nav(page: &Value, paginator: Option<&Value>) -> String {
    let number = page.get("number").and_then(Value::as_i64).unwrap_or(1);
    let num_pages = paginator
        .and_then(|p| p.get("num_pages"))
        .and_then(Value::as_i64)
        .unwrap_or(1);
    format!(
        "<nav class=\"pagination\" data-page=\"{}\" data-pages=\"{}\"></nav>",
        number, num_pages
    )
}

fn str_of<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
