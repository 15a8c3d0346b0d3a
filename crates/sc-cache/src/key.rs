//! Key and TTL helpers shared by engines.

use std::time::Duration;

/// Prepends the engine prefix to a cache key.
#[must_use]
pub fn prefixed_key(prefix: &str, key: &str) -> String {
    let mut physical = String::with_capacity(prefix.len() + key.len());
    physical.push_str(prefix);
    physical.push_str(key);
    physical
}

/// Glob pattern matching every key under `prefix`.
#[must_use]
pub fn prefix_pattern(prefix: &str) -> String {
    format!("{prefix}*")
}

/// Composite tag of a group name and its current version.
///
/// Hosts concatenate these tags into their keys, so bumping a group version
/// makes every key built from the old tag unreachable.
#[must_use]
pub fn group_tag(group: &str, version: &str) -> String {
    format!("{group}{version}")
}

/// Resolves the TTL in seconds for a write.
///
/// `None` falls back to the engine default. Sub-second durations round up to
/// one second so that a non-zero TTL never turns into "no expiry".
#[must_use]
pub fn effective_ttl(ttl: Option<Duration>, default_seconds: u64) -> u64 {
    match ttl {
        None => default_seconds,
        Some(duration) if duration.is_zero() => 0,
        Some(duration) => {
            let seconds = duration.as_secs();
            if duration.subsec_nanos() > 0 {
                seconds.saturating_add(1)
            } else {
                seconds
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_plain_concatenation() {
        assert_eq!(prefixed_key("app_", "user:1"), "app_user:1");
        assert_eq!(prefixed_key("", "user:1"), "user:1");
        assert_eq!(prefix_pattern("app_"), "app_*");
        assert_eq!(prefix_pattern(""), "*");
    }

    #[test]
    fn group_tags_embed_the_version() {
        assert_eq!(group_tag("posts", "1"), "posts1");
        assert_ne!(group_tag("posts", "1"), group_tag("posts", "2"));
    }

    #[test]
    fn ttl_resolution() {
        assert_eq!(effective_ttl(None, 3600), 3600);
        assert_eq!(effective_ttl(None, 0), 0);
        assert_eq!(effective_ttl(Some(Duration::ZERO), 3600), 0);
        assert_eq!(effective_ttl(Some(Duration::from_secs(10)), 3600), 10);
        assert_eq!(effective_ttl(Some(Duration::from_millis(1500)), 3600), 2);
        assert_eq!(effective_ttl(Some(Duration::from_millis(1)), 0), 1);
    }

    #[test]
    fn ttl_rounding_saturates_at_the_largest_duration() {
        assert_eq!(effective_ttl(Some(Duration::MAX), 3600), u64::MAX);
        assert_eq!(
            effective_ttl(Some(Duration::new(u64::MAX - 1, 1)), 3600),
            u64::MAX
        );
    }
}
