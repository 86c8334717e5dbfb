use chrono::{DateTime, TimeZone, Utc};

pub fn env_var(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| panic!("Missing environment variable {key}"))
}

pub fn env_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// formats a number of seconds as HH:MM:SS (fractional seconds truncated upstream)
pub fn format_hms(secs: u64) -> String {
    let mins = secs / 60;
    let hours = mins / 60;
    format!(
        "{hours:02}:{mins:02}:{secs:02}",
        hours = hours,
        mins = mins % 60,
        secs = secs % 60
    )
}

/// parses an elapsed time of the form H:MM:SS or HH:MM:SS into seconds
pub fn parse_hms(s: &str) -> Option<u64> {
    let re = regex::Regex::new(r"^(\d{1,2}):(\d{2}):(\d{2})$").ok()?;
    let caps = re.captures(s.trim())?;
    let h = caps.get(1)?.as_str().parse::<u64>().ok()?;
    let m = caps.get(2)?.as_str().parse::<u64>().ok()?;
    let sec = caps.get(3)?.as_str().parse::<u64>().ok()?;
    if m >= 60 || sec >= 60 {
        return None;
    }
    Some(h * 3600 + m * 60 + sec)
}

const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// the moment a discord account was created, derived from its snowflake id
pub fn snowflake_created_at(discord_id: u64) -> DateTime<Utc> {
    let ms = ((discord_id >> 22) as i64) + DISCORD_EPOCH_MS;
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
}
