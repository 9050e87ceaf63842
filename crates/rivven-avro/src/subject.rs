//! Subject naming strategies
//!
//! A strategy maps a topic and a key/value flag to the registry subject the
//! schema is registered under. [`TopicNameStrategy`] is the default.
//!
//! Closures work as strategies too:
//!
//! ```rust,ignore
//! let strategy = |topic: &str, is_key: bool| {
//!     Subject::new(format!("tenant-a.{}-{}", topic, if is_key { "key" } else { "value" }))
//! };
//! let transcoder = MessageTranscoder::builder(registry).strategy(strategy).build();
//! ```

use crate::types::Subject;

/// Strategy for generating subject names
pub trait SubjectNameStrategy: Send + Sync {
    /// Subject for the key (`is_key`) or value of a message on `topic`
    fn subject_name(&self, topic: &str, is_key: bool) -> Subject;
}

/// `{topic}-key` for keys, `{topic}-value` for values
#[derive(Debug, Clone, Copy, Default)]
pub struct TopicNameStrategy;

impl SubjectNameStrategy for TopicNameStrategy {
    fn subject_name(&self, topic: &str, is_key: bool) -> Subject {
        if is_key {
            Subject::key(topic)
        } else {
            Subject::value(topic)
        }
    }
}

impl<F> SubjectNameStrategy for F
where
    F: Fn(&str, bool) -> Subject + Send + Sync,
{
    fn subject_name(&self, topic: &str, is_key: bool) -> Subject {
        self(topic, is_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_name_strategy() {
        let strategy = TopicNameStrategy;
        assert_eq!(strategy.subject_name("orders", false).as_str(), "orders-value");
        assert_eq!(strategy.subject_name("orders", true).as_str(), "orders-key");
    }

    #[test]
    fn test_topic_name_keeps_case_and_dots() {
        let strategy = TopicNameStrategy;
        assert_eq!(
            strategy.subject_name("Billing.Events", false).as_str(),
            "Billing.Events-value"
        );
        assert_eq!(strategy.subject_name("", true).as_str(), "-key");
    }

    #[test]
    fn test_closure_strategy() {
        let strategy = |topic: &str, _is_key: bool| Subject::new(format!("shared.{}", topic));
        assert_eq!(strategy.subject_name("orders", true).as_str(), "shared.orders");

        let boxed: Box<dyn SubjectNameStrategy> = Box::new(strategy);
        assert_eq!(boxed.subject_name("orders", false).as_str(), "shared.orders");
    }
}
