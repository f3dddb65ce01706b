//! Template loading and rendering for the phone book pages

use crate::contact::Contact;
use crate::error::AppError;
use std::collections::HashMap;

// Embed templates at compile time
const BASE_HTML: &str = include_str!("../templates/base.html");
const HOME_HTML: &str = include_str!("../templates/home.html");
const SEARCH_HTML: &str = include_str!("../templates/search.html");
const ERROR_HTML: &str = include_str!("../templates/error.html");

const STYLES_CSS: &str = include_str!("../templates/styles.css");

const BACK_LINK: &str = r#"<a href="/">Back to Home</a>"#;

/// Template loader and renderer for the embedded HTML templates
pub struct TemplateEngine {
    templates: HashMap<&'static str, &'static str>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        let templates = HashMap::from([
            ("base", BASE_HTML),
            ("home", HOME_HTML),
            ("search", SEARCH_HTML),
            ("error", ERROR_HTML),
        ]);
        Self { templates }
    }

    /// Get embedded static asset content and its content type
    pub fn get_static_asset(&self, path: &str) -> Option<(&'static str, &'static str)> {
        match path {
            "styles.css" => Some((STYLES_CSS, "text/css; charset=utf-8")),
            _ => None,
        }
    }

    /// Render a template by name.
    ///
    /// `{{#if NAME}}...{{/if}}` blocks are kept only when `NAME` is `"true"`;
    /// blocks do not nest. `{{NAME}}` placeholders are then replaced in a
    /// single pass, so substituted values are never expanded again. Unknown
    /// placeholders are left as they are.
    pub fn render(
        &self,
        template_name: &str,
        variables: &HashMap<String, String>,
    ) -> Result<String, AppError> {
        let template = self.templates.get(template_name).ok_or_else(|| {
            AppError::InternalServerError(format!("Template '{template_name}' not found"))
        })?;

        let expanded = process_conditionals(template, variables);
        Ok(substitute(&expanded, variables))
    }

    /// Render `content_template` inside the base layout
    pub fn render_page(
        &self,
        content_template: &str,
        page_title: &str,
        header_actions: &str,
        variables: &HashMap<String, String>,
    ) -> Result<String, AppError> {
        let content = self.render(content_template, variables)?;

        let base_variables = HashMap::from([
            ("PAGE_TITLE".to_string(), html_escape(page_title)),
            ("HEADER_ACTIONS".to_string(), header_actions.to_string()),
            ("PAGE_CONTENT".to_string(), content),
            (
                "VERSION".to_string(),
                env!("CARGO_PKG_VERSION").to_string(),
            ),
        ]);

        self.render("base", &base_variables)
    }

    /// Home page: optional banner, add and search forms, and every contact.
    /// `stamp` is appended to photo links so browsers refetch them.
    pub fn render_home(
        &self,
        contacts: &[Contact],
        message: Option<&str>,
        stamp: u128,
    ) -> Result<String, AppError> {
        let rows: String = contacts
            .iter()
            .enumerate()
            .map(|(id, contact)| contact_row(id, contact, stamp, true))
            .collect();

        let mut variables = HashMap::new();
        let message = message.filter(|m| !m.is_empty());
        variables.insert("HAS_MESSAGE".to_string(), message.is_some().to_string());
        variables.insert("MESSAGE".to_string(), html_escape(message.unwrap_or("")));
        variables.insert("CONTACT_COUNT".to_string(), contacts.len().to_string());
        variables.insert("ROWS".to_string(), rows);

        self.render_page("home", "Phone Book Application", "", &variables)
    }

    /// Search results page. Ids in `hits` refer to the full contact list.
    pub fn render_search(
        &self,
        query: &str,
        hits: &[(usize, &Contact)],
        stamp: u128,
    ) -> Result<String, AppError> {
        let rows: String = hits
            .iter()
            .map(|(id, contact)| contact_row(*id, contact, stamp, false))
            .collect();

        let mut variables = HashMap::new();
        variables.insert("QUERY".to_string(), html_escape(query));
        variables.insert("HAS_RESULTS".to_string(), (!hits.is_empty()).to_string());
        variables.insert("NO_RESULTS".to_string(), hits.is_empty().to_string());
        variables.insert("ROWS".to_string(), rows);

        self.render_page("search", "Search Results", BACK_LINK, &variables)
    }

    /// Generate error page HTML using the base layout
    pub fn render_error_page(
        &self,
        status_code: u16,
        status_text: &str,
        description: &str,
    ) -> Result<String, AppError> {
        let mut variables = HashMap::new();
        variables.insert("ERROR_CODE".to_string(), status_code.to_string());
        variables.insert("ERROR_MESSAGE".to_string(), html_escape(status_text));
        variables.insert("ERROR_DESCRIPTION".to_string(), html_escape(description));

        let page_title = format!("{status_code} {status_text}");
        self.render_page("error", &page_title, BACK_LINK, &variables)
    }
}

/// One table row. The delete column is only shown on the home page.
fn contact_row(id: usize, contact: &Contact, stamp: u128, with_delete: bool) -> String {
    let name = html_escape(contact.name());

    let photo = if contact.has_photo() {
        format!(
            r#"<div class="photo-frame"><img src="/image?id={id}&amp;t={stamp}" class="contact-image" alt="Photo of {name}"></div>"#
        )
    } else {
        "No image".to_string()
    };

    let action = if with_delete {
        format!(
            r#"<td><form action="/delete" method="post"><input type="hidden" name="id" value="{id}"><button type="submit">Delete</button></form></td>"#
        )
    } else {
        String::new()
    };

    format!(
        "<tr><td>{name}</td><td>{}</td><td>{}</td><td>{photo}</td>{action}</tr>\n",
        html_escape(contact.phone()),
        html_escape(contact.cell_phone()),
    )
}

/// Process `{{#if VARIABLE}}...{{/if}}` blocks
fn process_conditionals(template: &str, variables: &HashMap<String, String>) -> String {
    const OPEN: &str = "{{#if ";
    const CLOSE: &str = "{{/if}}";

    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let (Some(var_end), Some(block_end)) = (after_open.find("}}"), after_open.find(CLOSE))
        else {
            break; // Malformed template
        };
        if var_end > block_end {
            break;
        }

        let variable = &after_open[..var_end];
        let block = &after_open[var_end + 2..block_end];

        result.push_str(&rest[..start]);
        if variables.get(variable).is_some_and(|v| v == "true") {
            result.push_str(block);
        }
        rest = &after_open[block_end + CLOSE.len()..];
    }

    result.push_str(rest);
    result
}

/// Replace `{{VARIABLE}}` placeholders in one left-to-right pass
fn substitute(template: &str, variables: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        match after.find("}}") {
            Some(end) => match variables.get(&after[..end]) {
                Some(value) => {
                    result.push_str(value);
                    rest = &after[end + 2..];
                }
                None => {
                    result.push_str("{{");
                    rest = after;
                }
            },
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    result.push_str(rest);
    result
}

/// Simple HTML entity escaping
pub fn html_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Get human-friendly error descriptions
pub fn get_error_description(status_code: u16) -> &'static str {
    match status_code {
        400 => "The request could not be understood due to malformed syntax.",
        404 => "The requested page or contact could not be found.",
        405 => "The request method is not allowed for this resource.",
        413 => "The request body exceeds the configured size limit.",
        500 => "An internal server error occurred while processing your request.",
        _ => "An unexpected error occurred while processing your request.",
    }
}
