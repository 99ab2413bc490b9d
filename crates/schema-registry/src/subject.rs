//! Subject naming.

/// How the subject a schema is registered under is derived.
///
/// Mirrors the strategies of the Confluent serializers so that subjects
/// line up with those written by other clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectNameStrategy {
    /// `<topic>-value`
    TopicName(String),
    /// The record's full name.
    RecordName,
    /// `<topic>-<record full name>`
    TopicRecordName(String),
}

impl SubjectNameStrategy {
    pub fn subject(&self, record_full_name: &str) -> String {
        match self {
            SubjectNameStrategy::TopicName(topic) => format!("{topic}-value"),
            SubjectNameStrategy::RecordName => record_full_name.to_string(),
            SubjectNameStrategy::TopicRecordName(topic) => format!("{topic}-{record_full_name}"),
        }
    }
}
