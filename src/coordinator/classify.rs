//! Content heuristics that pick a dispatch priority.

use crate::config::ClassifierConfig;
use crate::error::ConfigError;
use crate::queue::Priority;
use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone)]
pub struct PriorityClassifier {
    urgent: Option<Regex>,
    high: Option<Regex>,
    high_marker: char,
}

impl PriorityClassifier {
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            urgent: keyword_pattern("classifier.urgent_keywords", &config.urgent_keywords)?,
            high: keyword_pattern("classifier.high_keywords", &config.high_keywords)?,
            high_marker: config.high_marker,
        })
    }

    /// Urgent keywords win over high keywords and the marker; everything
    /// else is NORMAL. Keywords match case-insensitively anywhere.
    pub fn classify(&self, payload: &str) -> Priority {
        if self.urgent.as_ref().is_some_and(|re| re.is_match(payload)) {
            Priority::Urgent
        } else if payload.trim_start().starts_with(self.high_marker)
            || self.high.as_ref().is_some_and(|re| re.is_match(payload))
        {
            Priority::High
        } else {
            Priority::Normal
        }
    }
}

fn keyword_pattern(key: &str, keywords: &[String]) -> Result<Option<Regex>, ConfigError> {
    let alternatives: Vec<String> = keywords
        .iter()
        .filter(|k| !k.is_empty())
        .map(|k| regex::escape(k))
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> PriorityClassifier {
        PriorityClassifier::from_config(&ClassifierConfig::default()).unwrap()
    }

    #[test]
    fn keywords_and_marker() {
        let c = classifier();
        assert_eq!(c.classify("This is URGENT, call me"), Priority::Urgent);
        assert_eq!(c.classify("medical emergency"), Priority::Urgent);
        assert_eq!(c.classify("Important: read this"), Priority::High);
        assert_eq!(c.classify("!deploy now"), Priority::High);
        assert_eq!(c.classify("  !still a marker"), Priority::High);
        assert_eq!(c.classify("lunch?"), Priority::Normal);
        assert_eq!(c.classify("wow!"), Priority::Normal);
    }

    #[test]
    fn urgent_beats_high() {
        assert_eq!(classifier().classify("!important and urgent"), Priority::Urgent);
    }

    #[test]
    fn empty_keyword_lists_disable_matching() {
        let config = ClassifierConfig {
            urgent_keywords: vec![],
            high_keywords: vec![String::new()],
            high_marker: '#',
        };
        let c = PriorityClassifier::from_config(&config).unwrap();
        assert_eq!(c.classify("urgent"), Priority::Normal);
        assert_eq!(c.classify("#topic"), Priority::High);
    }

    #[test]
    fn keywords_are_literal() {
        let config = ClassifierConfig {
            urgent_keywords: vec!["a.b".to_string()],
            ..ClassifierConfig::default()
        };
        let c = PriorityClassifier::from_config(&config).unwrap();
        assert_eq!(c.classify("axb"), Priority::Normal);
        assert_eq!(c.classify("see a.b"), Priority::Urgent);
    }
}
