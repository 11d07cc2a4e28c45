use clap::Parser;
use ipnet::IpNet;
use std::net::IpAddr;
use std::time::Duration;
use tracing::warn;

use crate::network::parse_network;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "survey-intake")]
#[command(about = "Questionnaire intake and live statistics backend")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "SURVEY_PORT", default_value_t = 8080)]
    pub port: u16,

    // SQLite connection string
    #[arg(long, env = "SURVEY_DATABASE_URL", default_value = "sqlite://survey.db?mode=rwc")]
    pub database_url: String,

    // Max submissions per client per minute
    #[arg(long, env = "SURVEY_SUBMIT_RATE_LIMIT", default_value_t = 30)]
    pub submit_rate_limit: usize,

    // Max read requests per client per minute
    #[arg(long, env = "SURVEY_READ_RATE_LIMIT", default_value_t = 120)]
    pub read_rate_limit: usize,

    // Networks exempt from rate limiting (comma-separated CIDR)
    // Example: "127.0.0.0/8,10.0.0.0/8,::1/128"
    #[arg(long, env = "SURVEY_TRUSTED_NETWORKS", default_value = "127.0.0.0/8,::1/128")]
    pub trusted_networks: String,

    // Operator addresses exempt from rate limiting and duplicate checks
    #[arg(long, env = "SURVEY_ALLOW_LIST", default_value = "")]
    pub allow_list: String,

    // Read the client address from X-Forwarded-For / X-Real-IP.
    // Only enable behind a proxy that overwrites these headers.
    #[arg(long, env = "SURVEY_TRUST_FORWARDED_FOR", default_value_t = false)]
    pub trust_forwarded_for: bool,

    // Number of responses that counts as 100% progress
    #[arg(long, env = "SURVEY_TARGET_RESPONSES", default_value_t = 100)]
    pub target_responses: u64,

    // Cache TTL in seconds for the live counter
    #[arg(long, env = "SURVEY_COUNT_TTL", default_value_t = 3)]
    pub count_ttl: u64,

    // Cache TTL in seconds for progress stats
    #[arg(long, env = "SURVEY_PROGRESS_TTL", default_value_t = 10)]
    pub progress_ttl: u64,

    // Cache TTL in seconds for category breakdowns
    #[arg(long, env = "SURVEY_BREAKDOWN_TTL", default_value_t = 30)]
    pub breakdown_ttl: u64,

    // CORS origins (comma-separated), "*" allows any
    #[arg(long, env = "SURVEY_ALLOWED_ORIGINS", default_value = "*")]
    pub allowed_origins: String,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "sqlite://survey.db?mode=rwc".to_string(),
            submit_rate_limit: 30,
            read_rate_limit: 120,
            trusted_networks: "127.0.0.0/8,::1/128".to_string(),
            allow_list: String::new(),
            trust_forwarded_for: false,
            target_responses: 100,
            count_ttl: 3,
            progress_ttl: 10,
            breakdown_ttl: 30,
            allowed_origins: "*".to_string(),
        }
    }
}

impl Args {
    pub fn trusted_networks(&self) -> Vec<IpNet> {
        split_list(&self.trusted_networks)
            .filter_map(|s| match parse_network(s) {
                Ok(net) => Some(net),
                Err(e) => {
                    warn!(entry = s, error = %e, "ignoring malformed trusted network");
                    None
                }
            })
            .collect()
    }

    pub fn allow_list(&self) -> Vec<IpAddr> {
        split_list(&self.allow_list)
            .filter_map(|s| match s.parse::<IpAddr>() {
                Ok(ip) => Some(ip.to_canonical()),
                Err(e) => {
                    warn!(entry = s, error = %e, "ignoring malformed allow-list address");
                    None
                }
            })
            .collect()
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        split_list(&self.allowed_origins).map(str::to_string).collect()
    }

    pub fn count_ttl(&self) -> Duration {
        Duration::from_secs(self.count_ttl)
    }

    pub fn progress_ttl(&self) -> Duration {
        Duration::from_secs(self.progress_ttl)
    }

    pub fn breakdown_ttl(&self) -> Duration {
        Duration::from_secs(self.breakdown_ttl)
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',')
        .map(|s| s.trim()) // remove spaces
        .filter(|s| !s.is_empty()) // remove empty strings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_flags_skip_blanks_and_garbage() {
        let args = Args {
            trusted_networks: " 10.0.0.0/8, nonsense ,,::1/128".to_string(),
            allow_list: "192.168.1.20, 300.1.1.1".to_string(),
            ..Args::default()
        };

        assert_eq!(
            args.trusted_networks(),
            vec!["10.0.0.0/8".parse::<IpNet>().unwrap(), "::1/128".parse().unwrap()]
        );
        assert_eq!(
            args.allow_list(),
            vec!["192.168.1.20".parse::<IpAddr>().unwrap()]
        );
    }

    #[test]
    fn mapped_allow_list_entries_are_stored_as_ipv4() {
        let args = Args {
            allow_list: "::ffff:192.0.2.50".to_string(),
            ..Args::default()
        };
        assert_eq!(args.allow_list(), vec!["192.0.2.50".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn parses_flags() {
        let args = Args::parse_from([
            "survey-intake",
            "--port",
            "9000",
            "--submit-rate-limit",
            "5",
            "--trust-forwarded-for",
        ]);
        assert_eq!(args.port, 9000);
        assert_eq!(args.submit_rate_limit, 5);
        assert!(args.trust_forwarded_for);
        assert_eq!(args.count_ttl(), Duration::from_secs(3));
    }
}
