//! Server-rendered HTML for the login page and the prediction form.

use std::fmt::Write;

use crate::config::UiConfig;
use crate::predictor::Prediction;
use crate::story::StoryForm;
use crate::tier::{TIER_LEGEND, TIER_LEGEND_TITLE};
use crate::vocabulary::Field;

pub const MSG_ENTER_CREDENTIALS: &str = "Please enter your username and password";
pub const MSG_BAD_CREDENTIALS: &str = "Username/password is incorrect";

const FOOTER_NOTE: &str = "This app leverages deep learning for predicting story viewership tiers. \
Use results with editorial judgment.";

const STYLE: &str = "body{font-family:sans-serif;max-width:46rem;margin:2rem auto;padding:0 1rem}\
label{display:block;margin-top:.8rem;font-weight:600}select,input{width:100%;padding:.35rem}\
button{margin-top:1rem;padding:.45rem 1.2rem}.warning{background:#fff4d6;padding:.6rem}\
.error{background:#fde2e1;padding:.6rem}.success{background:#def5e3;padding:.6rem;font-weight:600}\
footer{margin-top:2.5rem;border-top:1px solid #ccc;padding-top:.8rem;font-size:.9rem}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice<'a> {
    Warning(&'a str),
    Error(&'a str),
}

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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

fn notice_html(notice: Option<Notice<'_>>) -> String {
    match notice {
        Some(Notice::Warning(msg)) => format!("<p class=\"warning\">{}</p>", escape(msg)),
        Some(Notice::Error(msg)) => format!("<p class=\"error\">{}</p>", escape(msg)),
        None => String::new(),
    }
}

fn footer(ui: &UiConfig) -> String {
    let mut html = format!("<footer><p><strong>Note</strong>: {}</p>", escape(FOOTER_NOTE));
    if let Some(contact) = ui.footer_contact.as_deref().filter(|c| !c.trim().is_empty()) {
        let _ = write!(html, "<p>For model details, contact: {}</p>", escape(contact));
    }
    html.push_str("</footer>");
    html
}

fn page(ui: &UiConfig, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
<title>{title}</title><style>{STYLE}</style></head><body>{body}{footer}</body></html>\n",
        title = escape(&ui.title),
        footer = footer(ui),
    )
}

pub fn login_page(ui: &UiConfig, notice: Option<Notice<'_>>) -> String {
    let body = format!(
        "<h2>Login</h2>\
<form method=\"post\" action=\"/login\" id=\"login\">\
<label for=\"username\">Username</label><input id=\"username\" name=\"username\" autocomplete=\"username\">\
<label for=\"password\">Password</label><input id=\"password\" name=\"password\" type=\"password\" autocomplete=\"current-password\">\
<button type=\"submit\">Login</button></form>{}",
        notice_html(notice)
    );
    page(ui, &body)
}

fn select(field: Field, selected: &str) -> String {
    let key = field.form_key();
    let mut html = format!(
        "<label for=\"{key}\">{}</label><select id=\"{key}\" name=\"{key}\">",
        escape(field.label())
    );
    let vocabulary = field.vocabulary();
    let chosen = if vocabulary.contains(&selected) { selected } else { vocabulary[0] };
    for value in vocabulary {
        let marker = if *value == chosen { " selected" } else { "" };
        let value = escape(value);
        let _ = write!(html, "<option value=\"{value}\"{marker}>{value}</option>");
    }
    html.push_str("</select>");
    html
}

fn result_html(prediction: &Prediction) -> String {
    let mut html = format!(
        "<p class=\"success\" id=\"result\">{}</p><p><strong>{}</strong></p><ul>",
        escape(&prediction.result.tier.headline()),
        TIER_LEGEND_TITLE
    );
    for line in TIER_LEGEND {
        let _ = write!(html, "<li>{}</li>", escape(line));
    }
    html.push_str("</ul>");
    html
}

/// The prediction form, with the previous selections kept and the outcome
/// of the last submission (if any) below it.
pub fn form_page(
    ui: &UiConfig,
    display_name: &str,
    form: &StoryForm,
    prediction: Option<&Prediction>,
    notice: Option<Notice<'_>>,
) -> String {
    let mut body = format!(
        "<form method=\"post\" action=\"/logout\"><button type=\"submit\">Logout</button></form>\
<p>Welcome <em>{}</em></p><h1>{}</h1><form method=\"post\" action=\"/predict\" id=\"story\">",
        escape(display_name),
        escape(&ui.title)
    );
    for field in Field::ALL {
        body.push_str(&select(field, form.value(field).trim()));
    }
    body.push_str("<button type=\"submit\">Predict Viewership Tier</button></form>");
    body.push_str(&notice_html(notice));
    if let Some(prediction) = prediction {
        body.push_str(&result_html(prediction));
    }
    page(ui, &body)
}

pub fn error_page(ui: &UiConfig, message: &str) -> String {
    page(ui, &format!("<h2>Something went wrong</h2>{}<p><a href=\"/\">Back</a></p>", notice_html(Some(Notice::Error(message)))))
}
