use dashmap::DashMap;
use ipnet::IpNet;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::network::in_networks;

const WINDOW: Duration = Duration::from_secs(60);
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(5 * 60);

// Rate window - recent request instants per IP, oldest first
#[derive(Default)]
pub struct RateWindow {
    pub hits: VecDeque<Instant>,
}

impl RateWindow {
    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.hits.front() {
            if now.duration_since(*oldest) >= WINDOW {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Exempt,
    Limited,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self != Decision::Limited
    }
}

pub struct RateLimiter {
    windows: DashMap<IpAddr, RateWindow>,
    trusted_networks: Vec<IpNet>,
    allow_list: Vec<IpAddr>,
    last_housekeeping: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(trusted_networks: Vec<IpNet>, allow_list: Vec<IpAddr>) -> Self {
        Self {
            windows: DashMap::new(),
            trusted_networks,
            allow_list,
            last_housekeeping: Mutex::new(Instant::now()),
        }
    }

    pub fn is_exempt(&self, ip: &IpAddr) -> bool {
        self.allow_list.contains(&ip.to_canonical()) || in_networks(&self.trusted_networks, ip)
    }

    pub fn check(&self, ip: IpAddr, max_per_minute: usize) -> Decision {
        // one window per client, whichever socket family it arrived on
        let ip = ip.to_canonical();
        if self.is_exempt(&ip) {
            return Decision::Exempt;
        }

        let now = Instant::now();
        self.housekeeping(now);

        // entry() holds the shard lock: prune, compare and append are one step
        let mut window = self.windows.entry(ip).or_default();
        window.prune(now);

        if window.hits.len() >= max_per_minute {
            return Decision::Limited;
        }
        window.hits.push_back(now);
        Decision::Allowed
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    // Purge idle clients at most once per interval
    fn housekeeping(&self, now: Instant) {
        {
            let mut last = self.last_housekeeping.lock().unwrap_or_else(|e| e.into_inner());
            if now.duration_since(*last) < HOUSEKEEPING_INTERVAL {
                return;
            }
            *last = now;
        }

        let before = self.windows.len();
        self.windows.retain(|_, window| {
            window
                .hits
                .back()
                .is_some_and(|latest| now.duration_since(*latest) < WINDOW)
        });
        tracing::debug!(
            purged = before.saturating_sub(self.windows.len()),
            remaining = self.windows.len(),
            "rate limiter housekeeping"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn limiter() -> RateLimiter {
        RateLimiter::new(vec!["10.0.0.0/8".parse().unwrap()], vec![ip("198.51.100.1")])
    }

    #[tokio::test(start_paused = true)]
    async fn thirty_first_request_is_limited_until_window_slides() {
        let limiter = limiter();
        let client = ip("203.0.113.5");

        for _ in 0..30 {
            assert_eq!(limiter.check(client, 30), Decision::Allowed);
        }
        advance(Duration::from_secs(1)).await;
        assert_eq!(limiter.check(client, 30), Decision::Limited);

        advance(Duration::from_secs(60)).await;
        assert_eq!(limiter.check(client, 30), Decision::Allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_attempts_are_not_recorded() {
        let limiter = limiter();
        let client = ip("203.0.113.6");

        assert!(limiter.check(client, 2).is_allowed());
        assert!(limiter.check(client, 2).is_allowed());
        for _ in 0..10 {
            assert_eq!(limiter.check(client, 2), Decision::Limited);
        }

        advance(WINDOW).await;
        assert!(limiter.check(client, 2).is_allowed());
        assert!(limiter.check(client, 2).is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn never_admits_more_than_limit_in_any_window() {
        let limiter = limiter();
        let client = ip("203.0.113.9");
        let mut admitted: Vec<Instant> = Vec::new();

        for _ in 0..600 {
            if limiter.check(client, 7).is_allowed() {
                admitted.push(Instant::now());
            }
            advance(Duration::from_millis(700)).await;
        }

        for (i, start) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < WINDOW)
                .count();
            assert!(in_window <= 7);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn clients_are_independent() {
        let limiter = limiter();
        assert!(limiter.check(ip("203.0.113.1"), 1).is_allowed());
        assert!(!limiter.check(ip("203.0.113.1"), 1).is_allowed());
        assert!(limiter.check(ip("203.0.113.2"), 1).is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn exemptions_bypass_the_limit() {
        let limiter = limiter();
        for _ in 0..50 {
            assert_eq!(limiter.check(ip("10.20.30.40"), 1), Decision::Exempt);
            assert_eq!(limiter.check(ip("198.51.100.1"), 1), Decision::Exempt);
        }
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn mapped_addresses_share_the_ipv4_window() {
        let limiter = limiter();
        assert_eq!(limiter.check(ip("::ffff:198.51.100.1"), 1), Decision::Exempt);

        assert!(limiter.check(ip("203.0.113.40"), 1).is_allowed());
        assert_eq!(limiter.check(ip("::ffff:203.0.113.40"), 1), Decision::Limited);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn housekeeping_purges_idle_clients() {
        let limiter = limiter();
        for n in 1..=20u8 {
            limiter.check(IpAddr::from([203, 0, 113, n]), 5);
        }
        assert_eq!(limiter.tracked_clients(), 20);

        advance(HOUSEKEEPING_INTERVAL).await;
        limiter.check(ip("192.0.2.1"), 5);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn concurrent_checks_respect_the_limit() {
        let limiter = std::sync::Arc::new(limiter());
        let client = ip("203.0.113.77");

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || limiter.check(client, 30).is_allowed())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 30);
    }
}
