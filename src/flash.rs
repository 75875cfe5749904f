use std::str::FromStr;

use cookie::{Cookie, SameSite};

pub const FLASH_COOKIE: &str = "flash";

/// A one-off notice shown on the next page a user sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flash {
    AccountCreated,
    LoggedOut,
    InvalidField,
    InvalidInput,
    DuplicateUsername,
    InvalidCredentials,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Info,
    Danger,
}

impl Flash {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccountCreated => "account-created",
            Self::LoggedOut => "logged-out",
            Self::InvalidField => "invalid-field",
            Self::InvalidInput => "invalid-input",
            Self::DuplicateUsername => "duplicate-username",
            Self::InvalidCredentials => "invalid-credentials",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::AccountCreated => "Account created successfully. Please log in.",
            Self::LoggedOut => "Logged out.",
            Self::InvalidField => "Invalid field.",
            Self::InvalidInput => "Provide username and password.",
            Self::DuplicateUsername => "Username already taken. Choose another.",
            Self::InvalidCredentials => "Invalid credentials.",
        }
    }

    pub fn level(self) -> Level {
        match self {
            Self::AccountCreated => Level::Success,
            Self::LoggedOut => Level::Info,
            _ => Level::Danger,
        }
    }

    /// Carries the notice across a redirect.
    pub fn cookie(self) -> Cookie<'static> {
        Cookie::build((FLASH_COOKIE, self.as_str()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build()
    }

    /// Sent once the notice has been shown.
    pub fn clear_cookie() -> Cookie<'static> {
        let mut cookie = Cookie::build((FLASH_COOKIE, "")).path("/").build();
        cookie.make_removal();
        cookie
    }
}

impl FromStr for Flash {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "account-created" => Self::AccountCreated,
            "logged-out" => Self::LoggedOut,
            "invalid-field" => Self::InvalidField,
            "invalid-input" => Self::InvalidInput,
            "duplicate-username" => Self::DuplicateUsername,
            "invalid-credentials" => Self::InvalidCredentials,
            _ => return Err(()),
        })
    }
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Danger => "danger",
        }
    }
}
