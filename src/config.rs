use crate::field::FieldMap;

/// Everything fixed at startup. Shared read-only for the life of the server.
#[derive(Debug, Clone)]
pub struct Config {
    pub channel: Channel,
    pub fields: FieldMap,
    pub secure_cookies: bool,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub id: String,
    pub read_key: String,
    pub upstream: String,
}
