//! Portal page rendering.

use std::fmt::Write as _;

use crate::config::ProvisionerConfig;

const PORTAL_TEMPLATE: &str = include_str!("../web/portal.html");

/// Renders the portal page with every `{{placeholder}}` substituted from
/// `config`. Unknown placeholders render empty.
pub fn render_page(config: &ProvisionerConfig) -> String {
    let mut page = String::with_capacity(PORTAL_TEMPLATE.len() + 1024);
    let mut rest = PORTAL_TEMPLATE;

    while let Some(start) = rest.find("{{") {
        page.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            page.push_str(&rest[start..]);
            return page;
        };
        substitute(&mut page, &after[..end], config);
        rest = &after[end + 2..];
    }

    page.push_str(rest);
    page
}

fn substitute(page: &mut String, name: &str, config: &ProvisionerConfig) {
    match name {
        "html_title" => push_html_escaped(page, &config.html_title),
        "theme_color" => push_css_value(page, &config.theme_color),
        "svg_logo" => push_js_template_escaped(page, &config.svg_logo),
        "project_title" => push_js_template_escaped(page, &config.project_title),
        "project_sub_title" => push_js_template_escaped(page, &config.project_sub_title),
        "project_info" => push_js_template_escaped(page, &config.project_info),
        "input_text" => push_js_template_escaped(page, &config.input_text),
        "connection_successful" => push_js_template_escaped(page, &config.connection_successful),
        "footer_text" => push_js_template_escaped(page, &config.footer_text),
        "reset_confirmation_text" => {
            push_js_template_escaped(page, &config.reset_confirmation_text)
        }
        "username_text" => push_js_template_escaped(page, &config.username_text),
        "service_password_text" => push_js_template_escaped(page, &config.service_password_text),
        "input_length" => {
            let _ = write!(page, "{}", config.input_length);
        }
        "show_reset_field" => page.push_str(if config.show_reset_field { "true" } else { "false" }),
        other => log::debug!("portal template has unknown placeholder `{other}`"),
    }
}

fn push_html_escaped(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
}

/// Escapes a value placed inside a JS template literal. Markup is kept so the
/// logo can be assigned to `innerHTML`.
fn push_js_template_escaped(out: &mut String, value: &str) {
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '`' => out.push_str("\\`"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            // keeps `</script>` inside a value from closing the script block
            '<' if chars.peek() == Some(&'/') => out.push_str("<\\"),
            _ => out.push(ch),
        }
    }
}

fn push_css_value(out: &mut String, value: &str) {
    out.extend(
        value
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '#' | '(' | ')' | ',' | '.' | '%' | ' ' | '-')),
    );
}
