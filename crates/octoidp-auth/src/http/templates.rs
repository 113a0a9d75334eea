//! Server-rendered HTML for the password login page.

const STYLES: &str = r#"
:root {
    --brand-primary: #3b3fe3;
    --brand-fire: #ff4d3d;
    --surface: #141629;
    --border: rgba(255, 255, 255, 0.08);
    --text-primary: #f8f9fe;
    --text-secondary: #adb5bd;
}
* { margin: 0; padding: 0; box-sizing: border-box; }
body {
    font-family: "Inter", -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
    background: radial-gradient(circle at top left, #1c1f40, #0d0e1a);
    min-height: 100vh;
    display: flex;
    justify-content: center;
    align-items: center;
    color: var(--text-primary);
}
.container { width: 100%; max-width: 420px; padding: 1rem; }
.card { background: var(--surface); border: 1px solid var(--border); border-radius: 12px; padding: 2rem; }
.card-title { font-size: 1.25rem; font-weight: 600; margin-bottom: 1.5rem; text-align: center; }
.form-group { margin-bottom: 1rem; }
.form-label { display: block; font-size: 0.875rem; color: var(--text-secondary); margin-bottom: 0.375rem; }
.form-input {
    width: 100%;
    padding: 0.625rem 0.75rem;
    border-radius: 6px;
    border: 1px solid var(--border);
    background: rgba(0, 0, 0, 0.25);
    color: var(--text-primary);
}
.btn { width: 100%; padding: 0.75rem; border: 0; border-radius: 6px; font-weight: 600; cursor: pointer; }
.btn-primary { background: var(--brand-primary); color: #fff; }
.alert-error {
    background: rgba(255, 77, 61, 0.15);
    border: 1px solid var(--brand-fire);
    border-radius: 6px;
    padding: 0.75rem;
    margin-bottom: 1rem;
    font-size: 0.875rem;
}
"#;

fn html_page(title: &str, content: &str) -> String {
    let mut html = String::with_capacity(content.len() + STYLES.len() + 512);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("    <meta charset=\"UTF-8\">\n");
    html.push_str(
        "    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
    );
    html.push_str("    <title>");
    html.push_str(&html_escape(title));
    html.push_str(" - OctoIDP</title>\n    <style>");
    html.push_str(STYLES);
    html.push_str("</style>\n</head>\n<body>\n    <div class=\"container\">\n");
    html.push_str(content);
    html.push_str("\n    </div>\n</body>\n</html>");
    html
}

/// Renders the username/password form of a Local or LDAP connector.
///
/// The form posts back to the URL it was served from, so the session ID
/// travels in the query string.
pub fn render_login_form(connector_name: &str, client_name: &str, error: Option<&str>) -> String {
    let mut content = String::with_capacity(2048);

    content.push_str("<div class=\"card\">\n<div class=\"card-title\">Sign in to ");
    content.push_str(&html_escape(client_name));
    content.push_str(" with ");
    content.push_str(&html_escape(connector_name));
    content.push_str("</div>\n");

    if let Some(e) = error {
        content.push_str("<div class=\"alert-error\">");
        content.push_str(&html_escape(e));
        content.push_str("</div>\n");
    }

    content.push_str("<form method=\"POST\">\n");
    content.push_str("<div class=\"form-group\">\n");
    content.push_str("<label class=\"form-label\" for=\"username\">Username</label>\n");
    content.push_str(
        "<input type=\"text\" id=\"username\" name=\"username\" class=\"form-input\" required autocomplete=\"username\">\n",
    );
    content.push_str("</div>\n<div class=\"form-group\">\n");
    content.push_str("<label class=\"form-label\" for=\"password\">Password</label>\n");
    content.push_str(
        "<input type=\"password\" id=\"password\" name=\"password\" class=\"form-input\" required autocomplete=\"current-password\">\n",
    );
    content.push_str("</div>\n");
    content.push_str("<button type=\"submit\" class=\"btn btn-primary\">Sign in</button>\n");
    content.push_str("</form>\n</div>");

    html_page("Sign In", &content)
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_form_with_error() {
        let html = render_login_form("LDAP", "Example App", Some("Invalid username or password"));
        assert!(html.contains("Invalid username or password"));
        assert!(html.contains("alert-error"));
        assert!(html.contains("with LDAP"));
    }

    #[test]
    fn test_login_form_escapes_names() {
        let html = render_login_form("Email", "<script>alert(1)</script>", None);
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("alert-error"));
    }
}
