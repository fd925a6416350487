use std::env;

/// One governor quota: a token is replenished every `replenish_secs`,
/// up to `burst_size` outstanding requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub replenish_secs: u64,
    pub burst_size: u32,
}

impl RateLimitRule {
    const fn new(replenish_secs: u64, burst_size: u32) -> Self {
        Self {
            replenish_secs,
            burst_size,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub auth: RateLimitRule,
    pub public_read: RateLimitRule,
    pub protected: RateLimitRule,
    /// Issue submission (multipart uploads).
    pub submit: RateLimitRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auth: RateLimitRule::new(5, 10),
            public_read: RateLimitRule::new(3, 20),
            protected: RateLimitRule::new(1, 20),
            submit: RateLimitRule::new(6, 10),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.enabled = super::env_flag("RATE_LIMIT_ENABLED", cfg.enabled);

        if let Ok(raw) = env::var("RATE_LIMIT_CONFIG") {
            match parse_rate_limit_config(&raw) {
                Ok(overrides) => cfg.apply(&overrides),
                Err(err) => {
                    tracing::warn!("Invalid RATE_LIMIT_CONFIG '{}': {}", raw, err);
                }
            }
        }

        cfg
    }

    fn apply(&mut self, overrides: &[(Group, RateLimitRule)]) {
        for (group, rule) in overrides {
            match group {
                Group::All => {
                    self.auth = *rule;
                    self.public_read = *rule;
                    self.protected = *rule;
                    self.submit = *rule;
                }
                Group::Auth => self.auth = *rule,
                Group::PublicRead => self.public_read = *rule,
                Group::Protected => self.protected = *rule,
                Group::Submit => self.submit = *rule,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    All,
    Auth,
    PublicRead,
    Protected,
    Submit,
}

/// Accepts either a global rule (`"5:10"`) or a grouped list
/// (`"auth=5:10,public=3:20,protected=1:20,submit=6:10"`).
fn parse_rate_limit_config(raw: &str) -> Result<Vec<(Group, RateLimitRule)>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty value".to_string());
    }

    if !trimmed.contains('=') {
        return Ok(vec![(Group::All, parse_rule(trimmed)?)]);
    }

    trimmed
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (name, raw_rule) = item
                .split_once('=')
                .ok_or_else(|| format!("invalid item '{}', expected name=secs:burst", item))?;
            let group = parse_group(name.trim())
                .ok_or_else(|| format!("unknown group '{}'", name.trim()))?;
            Ok((group, parse_rule(raw_rule.trim())?))
        })
        .collect()
}

fn parse_group(name: &str) -> Option<Group> {
    match name.to_ascii_lowercase().as_str() {
        "auth" => Some(Group::Auth),
        "public" | "public_read" | "public-read" => Some(Group::PublicRead),
        "protected" => Some(Group::Protected),
        "submit" | "report" => Some(Group::Submit),
        _ => None,
    }
}

fn parse_rule(raw: &str) -> Result<RateLimitRule, String> {
    let (secs_raw, burst_raw) = raw
        .split_once(':')
        .ok_or_else(|| format!("invalid rule '{}', expected secs:burst", raw))?;

    let replenish_secs: u64 = secs_raw
        .trim()
        .parse()
        .map_err(|_| format!("invalid replenish interval '{}'", secs_raw.trim()))?;
    let burst_size: u32 = burst_raw
        .trim()
        .parse()
        .map_err(|_| format!("invalid burst_size '{}'", burst_raw.trim()))?;

    if replenish_secs == 0 || burst_size == 0 {
        return Err("interval and burst must both be > 0".to_string());
    }

    Ok(RateLimitRule::new(replenish_secs, burst_size))
}
