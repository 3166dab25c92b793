use serde::{Deserialize, Serialize};

use crate::event::Role;
use crate::normalization;

/// The signed-in user attached to a request. Hydrated from the request
/// headers on every call; there is no ambient user state anywhere else.
#[derive(Clone, Debug, Serialize)]
pub struct Session {
    /// The user's email, which identifies them everywhere.
    pub email: String,

    /// The display name the client sent along, if any.
    pub display_name: Option<String>,
}

/// The header carrying the signed-in user's email.
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// The header carrying the signed-in user's display name.
pub const USER_NAME_HEADER: &str = "x-user-name";

impl Session {
    /// Builds a session from the raw header values. `None` when no
    /// usable email is present.
    pub fn from_headers(email: Option<String>, display_name: Option<String>) -> Option<Session> {
        let email = email?.trim().to_owned();

        if email.is_empty() {
            return None;
        }

        Some(Session {
            email,
            display_name: display_name
                .map(|name| name.trim().to_owned())
                .filter(|name| !name.is_empty()),
        })
    }
}

/// The payload of a sign-in, sent on every sign-in and on
/// role-changing actions.
#[derive(Clone, Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,

    #[serde(default)]
    #[serde(deserialize_with = "normalization::deserialize_option")]
    pub display_name: Option<String>,

    #[serde(default)]
    pub mobile_number: Option<String>,

    #[serde(default)]
    pub role: Option<Role>,
}
