//! `GET /api/locale?locale=<code>`: persists the UI locale in a cookie.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::SupportedLocales;

pub const LOCALE_COOKIE: &str = "NEXT_LOCALE";
const COOKIE_MAX_AGE_SECS: u64 = 31_536_000;

#[derive(Debug, Default, Deserialize)]
pub struct LocaleQuery {
    pub locale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LocaleBody {
    Set { success: bool, locale: String },
    Rejected { success: bool, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleReply {
    pub status: StatusCode,
    pub set_cookie: Option<String>,
    pub body: LocaleBody,
}

pub fn locale_reply(query: &LocaleQuery, supported: &SupportedLocales) -> LocaleReply {
    let requested = query.locale.as_deref().map(str::trim).unwrap_or_default();
    if requested.is_empty() {
        return rejected("Missing locale parameter".to_string());
    }
    if !supported.contains(requested) {
        return rejected(format!(
            "Unsupported locale {requested:?}; expected one of {}",
            supported.codes().join(", ")
        ));
    }
    LocaleReply {
        status: StatusCode::OK,
        set_cookie: Some(format!(
            "{LOCALE_COOKIE}={requested}; Path=/; Max-Age={COOKIE_MAX_AGE_SECS}; SameSite=Lax"
        )),
        body: LocaleBody::Set {
            success: true,
            locale: requested.to_string(),
        },
    }
}

fn rejected(error: String) -> LocaleReply {
    LocaleReply {
        status: StatusCode::BAD_REQUEST,
        set_cookie: None,
        body: LocaleBody::Rejected {
            success: false,
            error,
        },
    }
}
