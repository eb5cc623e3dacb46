//! Topic name/filter validation and wildcard matching.
//!
//! A topic *name* (on PUBLISH) is a concrete destination and may not contain
//! wildcards. A topic *filter* (on SUBSCRIBE/UNSUBSCRIBE) may use `+` for
//! exactly one level and a trailing `#` for all remaining levels.

use crate::error::{MqttError, Result};

/// Validates a concrete topic name: non-empty, wildcard-free.
pub fn validate_topic_name(topic: &str) -> Result<()> {
    if topic.is_empty() {
        return Err(MqttError::InvalidTopicName(
            "Topic name must not be empty".to_string(),
        ));
    }
    if topic.contains('+') || topic.contains('#') {
        return Err(MqttError::InvalidTopicName(format!(
            "Topic name must not contain wildcards: {topic}"
        )));
    }
    Ok(())
}

/// Validates a subscription filter: non-empty, `+` only as a whole level,
/// `#` only as the final whole level.
pub fn validate_topic_filter(filter: &str) -> Result<()> {
    if filter.is_empty() {
        return Err(MqttError::InvalidTopicFilter(
            "Topic filter must not be empty".to_string(),
        ));
    }
    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;
    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') {
            if *level != "#" {
                return Err(MqttError::InvalidTopicFilter(format!(
                    "'#' must occupy a whole level: {filter}"
                )));
            }
            if i != last {
                return Err(MqttError::InvalidTopicFilter(format!(
                    "'#' only allowed as the last level: {filter}"
                )));
            }
        } else if level.contains('+') && *level != "+" {
            return Err(MqttError::InvalidTopicFilter(format!(
                "'+' must occupy a whole level: {filter}"
            )));
        }
    }
    Ok(())
}

/// Checks whether a published topic name matches a subscription filter.
///
/// Filter levels are walked in order against the topic levels at the same
/// index: `#` matches everything remaining (including zero levels), `+`
/// matches exactly one existing level, a literal must be equal
/// (case-sensitive). A filter that runs out while the topic still has levels
/// does not match.
#[must_use]
pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
    let filter_levels: Vec<&str> = filter.split('/').collect();
    let topic_levels: Vec<&str> = topic.split('/').collect();

    for (i, level) in filter_levels.iter().enumerate() {
        match *level {
            "#" => return true,
            "+" => {
                if i >= topic_levels.len() {
                    return false;
                }
            }
            literal => {
                if i >= topic_levels.len() || literal != topic_levels[i] {
                    return false;
                }
            }
        }
    }

    topic_levels.len() <= filter_levels.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(topic_matches_filter("sensors/temp", "sensors/temp"));
        assert!(!topic_matches_filter("sensors/temp", "sensors/humidity"));
        assert!(!topic_matches_filter("sensors/temp", "sensors"));
        assert!(!topic_matches_filter("sensors", "sensors/temp"));
    }

    #[test]
    fn test_single_level_wildcard() {
        assert!(topic_matches_filter(
            "home/livingroom/temperature",
            "home/+/temperature"
        ));
        assert!(!topic_matches_filter(
            "home/livingroom/humidity",
            "home/+/temperature"
        ));
        assert!(topic_matches_filter("home/livingroom/temperature", "home/+/+"));
        assert!(!topic_matches_filter(
            "home/livingroom/temperature/extra",
            "home/+/+"
        ));
        // '+' requires an existing level
        assert!(!topic_matches_filter("sensors", "sensors/+"));
    }

    #[test]
    fn test_multi_level_wildcard() {
        assert!(topic_matches_filter("home/livingroom/temperature", "home/#"));
        assert!(topic_matches_filter("home", "home/#"));
        assert!(topic_matches_filter(
            "home/livingroom/temperature/extra",
            "home/+/temperature/#"
        ));
        assert!(topic_matches_filter("anything/at/all", "#"));
        assert!(!topic_matches_filter("other/temp", "home/#"));
    }

    #[test]
    fn test_plus_in_topic_is_literal() {
        // a literal '+' in the published topic only matches a '+' filter level
        assert!(!topic_matches_filter("home/+/temperature", "home/livingroom/temperature"));
        assert!(topic_matches_filter("home/+/temperature", "home/+/temperature"));
    }

    #[test]
    fn test_case_sensitive() {
        assert!(!topic_matches_filter("Sensors/Temp", "sensors/temp"));
    }

    #[test]
    fn test_empty_levels() {
        assert!(topic_matches_filter("sensors//temp", "sensors//temp"));
        assert!(topic_matches_filter("sensors//temp", "sensors/+/temp"));
        assert!(topic_matches_filter("/temp", "/temp"));
        assert!(topic_matches_filter("sensors/", "sensors/#"));
    }

    #[test]
    fn test_validate_topic_name() {
        assert!(validate_topic_name("sensors/temp").is_ok());
        assert!(validate_topic_name("").is_err());
        assert!(validate_topic_name("sensors/+/temp").is_err());
        assert!(validate_topic_name("sensors/#").is_err());
    }

    #[test]
    fn test_validate_topic_filter() {
        assert!(validate_topic_filter("sensors/temp").is_ok());
        assert!(validate_topic_filter("sensors/+/temp").is_ok());
        assert!(validate_topic_filter("sensors/#").is_ok());
        assert!(validate_topic_filter("#").is_ok());
        assert!(validate_topic_filter("+").is_ok());

        assert!(validate_topic_filter("").is_err());
        assert!(validate_topic_filter("sensors/#/temp").is_err());
        assert!(validate_topic_filter("sensors/temp#").is_err());
        assert!(validate_topic_filter("sensor+/temp").is_err());
    }
}
