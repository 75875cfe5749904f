//! HTML views. Templates are compiled into the binary and rendered with tera,
//! which escapes everything interpolated into a `.html` template.

use std::sync::Arc;

use log::{debug, error};
use serde::Serialize;
use serde_json::Value;
use tera::{Context, Tera};

use crate::dashboard::{Error, Result};
use crate::field::{self, FeedRecord, FieldMap, FieldReading, FieldValue};
use crate::flash::Flash;

const TEMPLATES: [(&str, &str); 7] = [
    ("base.html", include_str!("../templates/base.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("signup.html", include_str!("../templates/signup.html")),
    ("dashboard.html", include_str!("../templates/dashboard.html")),
    ("details.html", include_str!("../templates/details.html")),
    ("simulation.html", include_str!("../templates/simulation.html")),
    ("about.html", include_str!("../templates/about.html")),
];

#[derive(Clone)]
pub struct Pages {
    tera: Arc<Tera>,
}

#[derive(Serialize)]
struct Notice {
    level: &'static str,
    message: &'static str,
}

impl From<Flash> for Notice {
    fn from(flash: Flash) -> Self {
        Self {
            level: flash.level().as_str(),
            message: flash.message(),
        }
    }
}

#[derive(Serialize)]
struct LatestField<'a> {
    number: u32,
    name: &'a str,
    value: String,
}

#[derive(Serialize)]
struct HistoryRow<'a> {
    timestamp: &'a str,
    value: String,
}

fn display(value: Option<&FieldValue>) -> String {
    match value {
        None => "--".into(),
        Some(FieldValue::Number(n)) => n.to_string(),
        Some(FieldValue::Raw(Value::String(s))) => s.clone(),
        Some(FieldValue::Raw(other)) => other.to_string(),
    }
}

impl Pages {
    pub fn new() -> std::result::Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES)?;
        debug!("loaded {} templates", TEMPLATES.len());

        Ok(Self {
            tera: Arc::new(tera),
        })
    }

    fn render(
        &self,
        name: &str,
        title: &str,
        user: Option<&str>,
        flash: Option<Flash>,
        mut context: Context,
    ) -> Result<String> {
        context.insert("title", title);
        context.insert("user", &user);
        context.insert("flash", &flash.map(Notice::from));

        self.tera.render(name, &context).map_err(|e| {
            error!("couldn't render {name}: {e:?}");
            Error::Internal
        })
    }

    pub fn login(&self, flash: Option<Flash>) -> Result<String> {
        self.render("login.html", "Log in", None, flash, Context::new())
    }

    pub fn signup(&self, flash: Option<Flash>) -> Result<String> {
        self.render("signup.html", "Sign up", None, flash, Context::new())
    }

    pub fn dashboard(
        &self,
        user: &str,
        flash: Option<Flash>,
        latest: Option<&FeedRecord>,
        fields: &FieldMap,
    ) -> Result<String> {
        let updated = latest
            .and_then(|l| l.get("created_at"))
            .and_then(Value::as_str);

        let fields = fields
            .iter()
            .map(|(number, name)| LatestField {
                number,
                name,
                value: display(
                    FieldValue::normalize(latest.and_then(|l| l.get(&field::key(number)))).as_ref(),
                ),
            })
            .collect::<Vec<_>>();

        let mut context = Context::new();
        context.insert("updated", &updated);
        context.insert("fields", &fields);

        self.render("dashboard.html", "Dashboard", Some(user), flash, context)
    }

    pub fn details(&self, user: &str, field: u32, title: &str, history: &[FieldReading]) -> Result<String> {
        let history = history
            .iter()
            .map(|reading| HistoryRow {
                timestamp: reading.timestamp.as_deref().unwrap_or("--"),
                value: display(reading.value.as_ref()),
            })
            .collect::<Vec<_>>();

        let mut context = Context::new();
        context.insert("field", &field);
        context.insert("history", &history);

        self.render("details.html", title, Some(user), None, context)
    }

    pub fn simulation(&self, user: &str) -> Result<String> {
        self.render("simulation.html", "Simulation", Some(user), None, Context::new())
    }

    pub fn about(&self) -> Result<String> {
        self.render("about.html", "About", None, None, Context::new())
    }
}
