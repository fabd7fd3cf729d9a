//! Console configuration: serial port name/baud, reply timeout, and the
//! zero-fill scrub-on-retry toggle.

use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub port_name: String,
    pub baud_rate: u32,
    #[serde(with = "duration_secs")]
    pub reply_timeout: Duration,
    pub scrub_on_retry: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port_name: "COM4".to_string(),
            baud_rate: 115_200,
            reply_timeout: Duration::from_secs(6),
            scrub_on_retry: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("OCD_PORT") {
            config.port_name = port;
        }

        if let Ok(baud) = std::env::var("OCD_BAUD") {
            if let Ok(val) = baud.parse() {
                config.baud_rate = val;
            }
        }

        if let Ok(secs) = std::env::var("OCD_REPLY_TIMEOUT_SECS") {
            if let Ok(val) = secs.parse() {
                config.reply_timeout = Duration::from_secs(val);
            }
        }

        if let Ok(scrub) = std::env::var("OCD_SCRUB_ON_RETRY") {
            if let Ok(val) = scrub.parse() {
                config.scrub_on_retry = val;
            }
        }

        config
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_port_and_timeout() {
        let c = Config::default();
        assert_eq!(c.port_name, "COM4");
        assert_eq!(c.reply_timeout, Duration::from_secs(6));
        assert!(c.scrub_on_retry);
    }

    #[test]
    fn from_env_overrides_baud() {
        std::env::set_var("OCD_BAUD", "9600");
        let c = Config::from_env();
        assert_eq!(c.baud_rate, 9600);
        std::env::remove_var("OCD_BAUD");
    }
}
