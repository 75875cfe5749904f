use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

use crate::config::{Channel, Config};
use crate::field::FieldMap;

#[derive(Parser, Debug)]
pub struct Args {
    /// Whether clients connect to sensordash over https.
    /// If so, the sessionid cookie is sent as a secure cookie.
    #[arg(short, long)]
    secure: bool,

    /// The address sensordash should listen on. By default
    /// sensordash will listen just on the IPv4 loopback.
    #[arg(short, long)]
    address: Option<String>,

    /// The port sensordash listens on.
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Directory holding the user database.
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// ThingSpeak channel to read sensor fields from.
    #[arg(long, env = "SENSORDASH_CHANNEL_ID", default_value = "3117457")]
    channel_id: String,

    /// Read API key for the channel.
    #[arg(long, env = "SENSORDASH_READ_API_KEY", default_value = "", hide_env_values = true)]
    read_api_key: String,

    /// Base URL of the ThingSpeak API.
    #[arg(long, env = "SENSORDASH_UPSTREAM", default_value = "https://api.thingspeak.com")]
    upstream: String,
}

impl Args {
    pub fn addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.address
            .as_deref()
            .unwrap_or("127.0.0.1")
            .parse()
            .map(|addr: IpAddr| (addr, self.port).into())
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn config(&self) -> Config {
        Config {
            channel: Channel {
                id: self.channel_id.clone(),
                read_key: self.read_api_key.clone(),
                upstream: self.upstream.trim_end_matches('/').to_string(),
            },
            fields: FieldMap::default(),
            secure_cookies: self.secure(),
        }
    }
}
