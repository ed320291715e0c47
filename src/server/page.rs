const INDEX_HTML: &str = include_str!("../../templates/index.html");

pub enum PageResult<'a> {
    Prediction(&'a str),
    Error(&'a str),
}

/// Render the upload page, optionally with a prediction or error beneath the form.
pub fn render_index(result: Option<PageResult<'_>>) -> String {
    let fragment = match result {
        None => String::new(),
        Some(PageResult::Prediction(label)) => format!(
            "<p class=\"prediction\">Predicted emotion: <strong>{}</strong></p>",
            escape_html(label)
        ),
        Some(PageResult::Error(message)) => {
            format!("<p class=\"error\">{}</p>", escape_html(message))
        }
    };
    INDEX_HTML.replace("{{RESULT}}", &fragment)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
